use std::path::Path;

use tower_http::services::{ServeDir, ServeFile};

/// Static frontend mounted at the root.
///
/// Unknown paths fall back to `index.html` so client-side routing works.
pub fn service(web_root: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(web_root).fallback(ServeFile::new(web_root.join("index.html")))
}
