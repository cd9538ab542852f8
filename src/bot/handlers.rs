use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    audio::queue::TrackRequest,
    bot::QuaverBot,
    error::{PlayOutcome, PlaybackError},
    ui::embeds,
};

pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &QuaverBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        respond(ctx, &command, embeds::error("This command only works in a server")).await?;
        return Ok(());
    };

    info!(
        command = %command.data.name,
        user = %command.user.name,
        guild = guild_id.get(),
        "slash command"
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "add" => handle_add(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        "playall" => handle_playall(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "songs" => handle_songs(ctx, &command, bot, guild_id).await?,
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        other => {
            info!(command = other, "unknown command");
            respond(ctx, &command, embeds::error("Unknown command")).await?;
        }
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.announcer.bind(guild_id, command.channel_id);

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        respond(ctx, command, embeds::error("Join a voice channel first")).await?;
        return Ok(());
    };

    // Joining voice can outlast the inline response window.
    command.defer(&ctx.http).await?;

    let embed = match bot.service.play(guild_id, voice_channel).await {
        Ok(PlayOutcome::Started) => embeds::notice("▶️ Starting playback"),
        Ok(PlayOutcome::AlreadyRunning) => {
            embeds::notice("Already playing; new songs simply join the queue")
        }
        Err(PlaybackError::AlreadyEmpty) => {
            embeds::error("This server's queue is empty. Add some songs before playing!")
        }
        Err(e) => embeds::error(e.to_string()),
    };
    followup(ctx, command, embed).await
}

async fn handle_add(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.announcer.bind(guild_id, command.channel_id);

    let Some(reference) = option_str(command, "song") else {
        respond(ctx, command, embeds::error("Tell me what to add")).await?;
        return Ok(());
    };

    let len = bot.service.add_track(guild_id, reference, command.user.id);
    respond(
        ctx,
        command,
        embeds::notice(format!(
            "**{reference}** has been added to the end of the queue.\nQueue length: **{len}**"
        )),
    )
    .await
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.announcer.bind(guild_id, command.channel_id);

    let Some(url) = option_str(command, "url") else {
        respond(ctx, command, embeds::error("Give me a playlist URL")).await?;
        return Ok(());
    };
    let url = url.to_string();

    // Playlist expansion shells out to yt-dlp; too slow for an inline reply.
    command.defer(&ctx.http).await?;

    let cap = bot.config.playlist_import_cap;
    let entries = match bot.resolver.resolve_playlist(&url, cap).await {
        Ok(entries) => entries,
        Err(e) => {
            followup(ctx, command, embeds::error(e.to_string())).await?;
            return Ok(());
        }
    };

    let queued = entries.len();
    let len = bot.service.add_playlist(guild_id, entries, command.user.id);

    // Enqueue first, then a single start request for the whole import.
    start_after_import(ctx, command, bot, guild_id).await;

    followup(
        ctx,
        command,
        embeds::notice(format!(
            "Queued the first **{queued}** songs of the playlist.\nQueue length: **{len}**"
        )),
    )
    .await
}

async fn handle_playall(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.announcer.bind(guild_id, command.channel_id);

    // Joining voice on the way can outlast the inline response window.
    command.defer(&ctx.http).await?;

    let entries = bot.library.entries(guild_id).await?;
    if entries.is_empty() {
        followup(
            ctx,
            command,
            embeds::error("There are no songs downloaded in this server yet"),
        )
        .await?;
        return Ok(());
    }

    let requests: Vec<TrackRequest> = entries
        .into_iter()
        .map(|entry| {
            TrackRequest::new(entry.path.display().to_string(), command.user.id)
                .with_title(entry.title)
        })
        .collect();
    let queued = requests.len();
    let len = bot.service.add_all(guild_id, requests);

    start_after_import(ctx, command, bot, guild_id).await;

    followup(
        ctx,
        command,
        embeds::notice(format!(
            "Queued **{queued}** downloaded songs.\nQueue length: **{len}**"
        )),
    )
    .await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let titles = bot.service.list_queue(guild_id);
    let embed = if titles.is_empty() {
        embeds::notice("The queue is empty :(")
    } else {
        embeds::queue_list(&titles)
    };
    respond(ctx, command, embed).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(index) = option_int(command, "index").and_then(|i| usize::try_from(i).ok()) else {
        respond(ctx, command, embeds::error("Give me a queue position")).await?;
        return Ok(());
    };

    let embed = match bot.service.remove_track(guild_id, index) {
        Ok(title) => embeds::notice(format!("Removed **{title}** from the queue")),
        Err(e) => embeds::error(e.to_string()),
    };
    respond(ctx, command, embed).await
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.service.clear_queue(guild_id);
    respond(ctx, command, embeds::notice("Queue has been cleared")).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = if bot.service.is_playing(guild_id) {
        bot.service.skip_current(guild_id);
        embeds::notice("⏭️ Skipped")
    } else {
        embeds::notice("Nothing is playing right now")
    };
    respond(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.service.stop(guild_id);
    respond(
        ctx,
        command,
        embeds::notice("⏹️ Stopped playback. The queue is untouched"),
    )
    .await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.now_playing(guild_id) {
        Some(title) => embeds::notice(format!("🎵 Now playing: **{title}**")),
        None => embeds::notice("Nothing is playing right now"),
    };
    respond(ctx, command, embed).await
}

async fn handle_songs(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let titles = bot.library.titles(guild_id).await?;
    let embed = if titles.is_empty() {
        embeds::notice(
            "There are currently no songs downloaded for this server.\n\
             Drop files into the server's library directory to play them",
        )
    } else {
        embeds::library_list(&titles)
    };
    respond(ctx, command, embed).await
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        respond(ctx, command, embeds::error("Join a voice channel first")).await?;
        return Ok(());
    };

    command.defer(&ctx.http).await?;

    let embed = match bot.service.join(guild_id, voice_channel).await {
        Ok(()) => embeds::notice("Joining your voice channel"),
        Err(e) => embeds::error(e.to_string()),
    };
    followup(ctx, command, embed).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.service.leave(guild_id).await {
        Ok(()) => embeds::notice("Leaving the voice channel"),
        Err(e) => embeds::error(e.to_string()),
    };
    respond(ctx, command, embed).await
}

/// Import commands trigger exactly one start request once everything is
/// queued; a session that is already draining keeps going.
async fn start_after_import(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QuaverBot,
    guild_id: GuildId,
) {
    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return;
    };
    match bot.service.play(guild_id, voice_channel).await {
        Ok(_) | Err(PlaybackError::AlreadyEmpty) => {}
        Err(e) => {
            info!(guild = guild_id.get(), error = %e, "auto-start after import failed");
        }
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache.guild(guild_id).and_then(|guild| {
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
    })
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

async fn followup(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new().embed(embed),
        )
        .await?;
    Ok(())
}
