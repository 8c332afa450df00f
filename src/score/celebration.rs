//! Celebration clip selection by scorer surname.

/// Clip played when the scorer is unknown or has no dedicated clip.
pub const DEFAULT_CLIP: &str = "другие.mp4";

/// Map a scorer surname to a celebration clip file name.
///
/// Matching is case-insensitive; several spellings of the same player map
/// to one clip. Total: every input, including no surname at all, yields a
/// clip.
pub fn select_celebration(player: Option<&str>) -> &'static str {
    let Some(player) = player else {
        return DEFAULT_CLIP;
    };
    match player.to_lowercase().as_str() {
        "богомолов" | "багич" => "богомолов.mp4",
        "заночуев" => "заночуев.mp4",
        "панфер" | "панфёр" | "панферов" | "панфёров" => "панферов.mp4",
        "писарь" | "писарев" => "писарев.mp4",
        "шева" | "шевченко" => "шевченко.mp4",
        _ => DEFAULT_CLIP,
    }
}
