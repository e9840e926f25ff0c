// Turning a Source into a byte stream Symphonia can probe

use soundroom_core::{AudioError, Result, Source};
use soundroom_transport_http::{HttpConfig, HttpSource};
use std::fs::File;
use std::io::Cursor;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

/// Byte stream plus what we know about it before probing
pub struct OpenedSource {
    pub media: Box<dyn MediaSource>,
    pub hint: Hint,
    /// A forward-only network stream with no end
    pub live: bool,
}

/// Open the bytes behind `source`.
/// Anything that cannot be opened is a `SourceResolutionError`.
pub fn open_media_source(source: &Source, http: &HttpConfig) -> Result<OpenedSource> {
    let mut hint = Hint::new();
    if let Some(ext) = source.extension_hint() {
        hint.with_extension(&ext);
    }

    match source {
        Source::Path(_) => {
            let path = source.resolve_path().ok_or_else(|| {
                AudioError::SourceResolutionError(format!(
                    "Cannot resolve {} against the working directory",
                    source
                ))
            })?;
            if !path.is_file() {
                return Err(AudioError::SourceResolutionError(format!(
                    "{} is not a readable file",
                    path.display()
                )));
            }
            let file = File::open(&path).map_err(|e| {
                AudioError::SourceResolutionError(format!("{}: {}", path.display(), e))
            })?;
            log::debug!("Opened file {}", path.display());

            Ok(OpenedSource {
                media: Box::new(file),
                hint,
                live: false,
            })
        }
        Source::Url(url) => match url.scheme() {
            "http" | "https" => {
                let remote = HttpSource::open(url.as_str(), http).map_err(|e| {
                    AudioError::SourceResolutionError(format!("{}: {}", url, e))
                })?;
                if let Some(content_type) = &remote.info().content_type {
                    hint.mime_type(content_type);
                }
                let live = !remote.is_seekable();

                Ok(OpenedSource {
                    media: Box::new(remote),
                    hint,
                    live,
                })
            }
            scheme => Err(AudioError::SourceResolutionError(format!(
                "Unsupported scheme '{}' in {}",
                scheme, url
            ))),
        },
        Source::Bytes { data, .. } => Ok(OpenedSource {
            media: Box::new(Cursor::new(data.clone())),
            hint,
            live: false,
        }),
    }
}
