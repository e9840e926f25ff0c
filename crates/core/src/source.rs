// Media sources accepted by a player

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Where a player loads its media from.
///
/// Strings are classified without touching the filesystem or network;
/// whether the source actually exists is decided by the backend when it
/// creates the media object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Absolute or relative filesystem path
    Path(PathBuf),
    /// Remote location (http, https, or any other scheme the backend knows)
    Url(Url),
    /// Encoded media already held in memory, with an optional format hint
    /// such as `"mp3"`
    Bytes { data: Arc<[u8]>, hint: Option<String> },
}

impl Source {
    /// Classify a user supplied location.
    ///
    /// `file://` URIs become paths. A `file://host/rest` URI with a host
    /// other than `localhost` is read as the absolute path `/host/rest`.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if has_scheme(trimmed) {
            if let Ok(url) = Url::parse(trimmed) {
                if url.scheme() == "file" {
                    return Source::Path(file_url_to_path(&url));
                }
                return Source::Url(url);
            }
        }

        Source::Path(PathBuf::from(trimmed))
    }

    /// In-memory encoded media
    pub fn bytes(data: impl Into<Arc<[u8]>>, hint: Option<&str>) -> Self {
        Source::Bytes {
            data: data.into(),
            hint: hint.map(|h| h.trim_start_matches('.').to_ascii_lowercase()),
        }
    }

    /// Absolute location of a path source, resolving relative paths
    /// against the current working directory
    pub fn resolve_path(&self) -> Option<PathBuf> {
        match self {
            Source::Path(path) if path.is_absolute() => Some(path.clone()),
            Source::Path(path) => std::env::current_dir().ok().map(|cwd| cwd.join(path)),
            _ => None,
        }
    }

    /// File extension usable as a container/codec hint
    pub fn extension_hint(&self) -> Option<String> {
        match self {
            Source::Path(path) => extension_of(path),
            Source::Url(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|last| extension_of(Path::new(last))),
            Source::Bytes { hint, .. } => hint.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Source::Url(_))
    }
}

/// True for `scheme:` prefixes of two or more characters, so Windows drive
/// letters (`C:\music`) stay paths
fn has_scheme(input: &str) -> bool {
    match input.find(':') {
        Some(idx) if idx > 1 => {
            let scheme = &input[..idx];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

fn file_url_to_path(url: &Url) -> PathBuf {
    if let Ok(path) = url.to_file_path() {
        return path;
    }

    // file://home/user/a.wav: fold the host back into the path
    let host = url.host_str().unwrap_or_default();
    match Url::parse(&format!("file:///{}{}", host, url.path())) {
        Ok(rebuilt) => rebuilt
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(format!("/{}{}", host, url.path()))),
        Err(_) => PathBuf::from(format!("/{}{}", host, url.path())),
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Url(url) => write!(f, "{}", url),
            Source::Bytes { data, .. } => write!(f, "<memory: {} bytes>", data.len()),
        }
    }
}

impl From<&str> for Source {
    fn from(input: &str) -> Self {
        Source::parse(input)
    }
}

impl From<String> for Source {
    fn from(input: String) -> Self {
        Source::parse(&input)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<Url> for Source {
    fn from(url: Url) -> Self {
        if url.scheme() == "file" {
            Source::Path(file_url_to_path(&url))
        } else {
            Source::Url(url)
        }
    }
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::bytes(data, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths() {
        assert_eq!(
            Source::parse("/home/user/Music/audio.wav"),
            Source::Path(PathBuf::from("/home/user/Music/audio.wav"))
        );
        assert_eq!(
            Source::parse("relative/path/audio.wav"),
            Source::Path(PathBuf::from("relative/path/audio.wav"))
        );
        assert_eq!(
            Source::parse(r"C:\Music\audio.wav"),
            Source::Path(PathBuf::from(r"C:\Music\audio.wav"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uris() {
        assert_eq!(
            Source::parse("file:///home/user/Music/my%20song.wav"),
            Source::Path(PathBuf::from("/home/user/Music/my song.wav"))
        );
        assert_eq!(
            Source::parse("file://localhost/tmp/a.mp3"),
            Source::Path(PathBuf::from("/tmp/a.mp3"))
        );
        assert_eq!(
            Source::parse("file://home/user/Music/audio.wav"),
            Source::Path(PathBuf::from("/home/user/Music/audio.wav"))
        );
    }

    #[test]
    fn test_remote_urls() {
        let source = Source::parse("http://website.com/audio.wav");
        assert!(source.is_remote());
        assert_eq!(source.extension_hint().as_deref(), Some("wav"));

        let source = Source::parse("https://example.org/stream?id=3");
        assert!(source.is_remote());
        assert_eq!(source.extension_hint(), None);
    }

    #[test]
    fn test_relative_resolution() {
        let source = Source::parse("relative/to/project/audio.wav");
        let resolved = source.resolve_path().unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/to/project/audio.wav"));

        assert_eq!(Source::parse("http://a.b/c.mp3").resolve_path(), None);
    }

    #[test]
    fn test_bytes_hint_is_normalized() {
        let source = Source::bytes(vec![1u8, 2, 3], Some(".MP3"));
        assert_eq!(source.extension_hint().as_deref(), Some("mp3"));
        assert_eq!(source.to_string(), "<memory: 3 bytes>");
    }
}
