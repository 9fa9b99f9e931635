use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct EmbeddedAssets;

/// Returns an embedded asset (pattern catalog, prompt templates) as text.
pub fn get_embedded_file(path: &str) -> Option<String> {
    EmbeddedAssets::get(path.trim_start_matches('/')).map(|content| {
        let bytes = content.data.to_vec();
        String::from_utf8_lossy(&bytes).to_string()
    })
}
