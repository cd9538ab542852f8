use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        add_command(),
        playlist_command(),
        playall_command(),
        queue_command(),
        remove_command(),
        clear_command(),
        skip_command(),
        stop_command(),
        nowplaying_command(),
        songs_command(),
        join_command(),
        leave_command(),
    ]
}

/// Registers commands globally (propagation can take up to an hour).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registers commands on a single guild, for development.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play").description("Play the queue in your voice channel")
}

fn add_command() -> CreateCommand {
    CreateCommand::new("add")
        .description("Add a song to the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "song",
                "Link, search term, or downloaded song name",
            )
            .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Queue the first songs of a playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "Playlist URL")
                .required(true),
        )
}

fn playall_command() -> CreateCommand {
    CreateCommand::new("playall").description("Queue every downloaded song of this server")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("List the songs in the queue")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove a song from the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "index",
                "Position shown by /queue",
            )
            .min_int_value(0)
            .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Empty the queue")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback and leave the voice channel")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the current song")
}

fn songs_command() -> CreateCommand {
    CreateCommand::new("songs").description("List the songs downloaded for this server")
}

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leave the voice channel")
}
