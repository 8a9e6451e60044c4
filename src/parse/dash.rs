//! Parsing of adaptive (MPEG-DASH) manifests into raw stream descriptors.

use crate::error::{Error, ErrorContext, Result};
use crate::stream::{Container, Fragment, StreamDescriptor, StreamSource};

/// Extract one [`StreamDescriptor`] per representation of a dash manifest. Representations
/// without a numeric id or a base url are not addressable through the platform and skipped.
pub(crate) fn parse_dash_manifest(xml: &str) -> Result<Vec<StreamDescriptor>> {
    let mpd = dash_mpd::parse(xml)
        .map_err(|e| Error::Decode(ErrorContext::new(format!("invalid dash manifest: {e}"))))?;

    let mut descriptors = Vec::new();
    for period in mpd.periods {
        for adaptation in period.adaptations {
            let adaptation_mime = adaptation.mimeType.clone();
            let adaptation_codecs = adaptation.codecs.clone();
            let adaptation_kind = adaptation.contentType.clone();

            for representation in adaptation.representations {
                let Some(itag) = representation
                    .id
                    .as_deref()
                    .and_then(|id| id.parse::<u64>().ok())
                else {
                    continue;
                };
                let Some(url) = representation
                    .BaseURL
                    .first()
                    .map(|base| base.base.clone())
                else {
                    continue;
                };

                let mime = representation
                    .mimeType
                    .clone()
                    .or_else(|| adaptation_mime.clone())
                    .unwrap_or_default();
                let kind = adaptation_kind
                    .clone()
                    .unwrap_or_else(|| mime.split('/').next().unwrap_or_default().to_string());
                let container =
                    Container::from(mime.split('/').nth(1).unwrap_or_default().to_string());
                let codec = representation
                    .codecs
                    .clone()
                    .or_else(|| adaptation_codecs.clone());

                let fragments = representation
                    .SegmentList
                    .as_ref()
                    .map(|list| {
                        list.segment_urls
                            .iter()
                            .filter_map(|segment| segment.media.clone())
                            .map(|path| Fragment { path })
                            .collect()
                    })
                    .unwrap_or_default();

                let audio = kind == "audio";
                descriptors.push(StreamDescriptor {
                    itag,
                    url,
                    container,
                    audio_codec: codec.clone().filter(|_| audio),
                    video_codec: codec.filter(|_| !audio),
                    bitrate: representation.bandwidth.unwrap_or_default(),
                    content_length: None,
                    width: representation.width.map(|width| width as u32),
                    height: representation.height.map(|height| height as u32),
                    quality_label: None,
                    framerate: representation.frameRate.as_deref().and_then(parse_framerate),
                    fragments,
                    source: StreamSource::Adaptive,
                    audio_only: audio,
                    video_only: !audio,
                    audio_track: None,
                })
            }
        }
    }

    Ok(descriptors)
}

/// Dash frame rates come as plain numbers or as a `numerator/denominator` pair.
fn parse_framerate(raw: &str) -> Option<f64> {
    let mut split = raw.split('/');
    let left: f64 = split.next()?.parse().ok()?;
    match split.next() {
        Some(right) => {
            let right: f64 = right.parse().ok()?;
            (right != 0f64).then(|| left / right)
        }
        None => Some(left),
    }
}
