//! HEAD adaptation policy
//!
//! Some backends refuse `HEAD` on objects with certain extensions. Those
//! requests are sent as a `HEAD` against a URL presigned for `GET`.

/// Extensions the backend cannot serve `HEAD` for
pub const DEFAULT_HEAD_UNSUPPORTED_EXTENSIONS: &[&str] = &[
    "7z", "csv", "gif", "midi", "png", "tif", "zip", "avi", "doc", "gz", "mkv", "ppt", "tiff",
    "zst", "avif", "docx", "ico", "mp3", "pptx", "ttf", "apk", "dmg", "iso", "mp4", "ps", "webm",
    "bin", "ejs", "jar", "ogg", "rar", "webp", "bmp", "eot", "jpg", "otf", "svg", "woff", "bz2",
    "eps", "jpeg", "pdf", "svgz", "woff2", "class", "exe", "js", "pict", "swf", "xls", "css",
    "flac", "mid", "pls", "tar", "xlsx",
];

/// Decides which `HEAD` requests need adapting
#[derive(Debug, Clone)]
pub struct HeadPolicy {
    extensions: Vec<String>,
}

impl Default for HeadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HEAD_UNSUPPORTED_EXTENSIONS.iter().copied())
    }
}

impl HeadPolicy {
    /// Policy over the given extensions (with or without a leading dot)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// Built-in list unless `overrides` is given
    pub fn from_overrides(overrides: Option<&[String]>) -> Self {
        match overrides {
            Some(extensions) => Self::new(extensions),
            None => Self::default(),
        }
    }

    /// True if `path` ends in `.<ext>` for a listed extension, ignoring case
    pub fn is_unsupported(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.extensions.iter().any(|ext| {
            path.len() > ext.len()
                && path.ends_with(ext.as_str())
                && path.as_bytes()[path.len() - ext.len() - 1] == b'.'
        })
    }
}
