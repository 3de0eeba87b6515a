//! Mime type tags used to tell folders and native documents apart.

/// Mime type the remote store uses for folders.
pub const FOLDER: &str = "application/vnd.google-apps.folder";

/// Mime type recorded for uploads until the remote reports the real one.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Prefix shared by every store-native document kind (docs, sheets, ...).
const NATIVE_PREFIX: &str = "application/vnd.google-apps.";

/// Check if a mime type denotes a folder.
pub fn is_folder(mime_type: &str) -> bool {
    mime_type == FOLDER
}

/// Check if a mime type is a store-native document kind.
///
/// Folders share the native prefix and count as native too.
pub fn is_native(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_PREFIX)
}

/// Native kinds have no byte content to fetch; export is not supported.
pub fn is_downloadable(mime_type: &str) -> bool {
    !is_folder(mime_type) && !is_native(mime_type)
}
