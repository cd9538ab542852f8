use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

/// Standard colour palette for the bot's embeds.
pub mod colors {
    use serenity::all::Colour;

    pub const ACCENT_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Quaver";

pub fn now_playing(title: &str, up_next: Option<&str>, remaining: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{title}**"))
        .color(colors::ACCENT_PURPLE)
        .timestamp(Timestamp::now());

    if let Some(next) = up_next {
        embed = embed.field("Up next", format!("**{next}**"), true);
    }

    let footer = match remaining {
        0 => "Nothing else is queued".to_string(),
        1 => "1 song left in the queue".to_string(),
        n => format!("{n} songs left in the queue"),
    };
    embed.footer(CreateEmbedFooter::new(footer))
}

/// Numbered listing in queue order, `` `i` - title `` per line.
pub fn queue_list(titles: &[String]) -> CreateEmbed {
    let lines: Vec<String> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("`{i}` - {title}"))
        .collect();

    CreateEmbed::default()
        .title("📜 Queue")
        .description(lines.join("\n"))
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn library_list(titles: &[String]) -> CreateEmbed {
    let lines: Vec<String> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("`{i}` - {title}"))
        .collect();

    CreateEmbed::default()
        .title("💾 Downloaded songs")
        .description(lines.join("\n"))
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn notice(text: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .description(text.into())
        .color(colors::SUCCESS_GREEN)
}

pub fn error(text: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("❌ {}", text.into()))
        .color(colors::ERROR_RED)
}
