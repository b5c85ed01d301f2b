use std::path::Path;

use mime_guess::{from_path, mime, Mime};
use tracing::debug;

/// Looks the file's extension up in the MIME table. A miss is not an error:
/// the file is served as `application/octet-stream`.
pub fn resolve(path: impl AsRef<Path>) -> Mime {
    let path = path.as_ref();
    match from_path(path).first() {
        Some(mime) => mime,
        None => {
            debug!(path = %path.display(), "could not determine file type");
            mime::APPLICATION_OCTET_STREAM
        }
    }
}
