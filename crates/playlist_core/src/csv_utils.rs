use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};

use crate::categories::CategoriesRegistry;
use crate::errors::PlaylistError;
use crate::video_index::Video;

pub const FIELDNAMES: [&str; 5] = [
    "video_id",
    "playlist_ids",
    "title",
    "channel_title",
    "description",
];

pub const PLAYLIST_DELIMITER: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub video_id: String,
    pub playlist_ids: String,
    pub title: String,
    pub channel_title: String,
    pub description: String,
}

impl VideoRecord {
    /// Flattens a video into one row. With a registry, playlist ids are
    /// replaced by their category labels.
    pub fn from_video(video: &Video, labels: Option<&CategoriesRegistry>) -> Self {
        let playlists: Vec<&str> = video
            .playlist_ids()
            .into_iter()
            .map(|id| match labels {
                Some(registry) => registry.label_for(id),
                None => id,
            })
            .collect();
        Self {
            video_id: video.video_id.clone(),
            playlist_ids: playlists.join(PLAYLIST_DELIMITER),
            title: video.title.clone().unwrap_or_default(),
            channel_title: video.channel_title.clone().unwrap_or_default(),
            description: escape_newlines(video.description.as_deref().unwrap_or_default()),
        }
    }

    fn as_record(&self) -> [&str; 5] {
        [
            self.video_id.as_str(),
            self.playlist_ids.as_str(),
            self.title.as_str(),
            self.channel_title.as_str(),
            self.description.as_str(),
        ]
    }
}

/// Escapes line breaks to the two characters `\n`. An existing literal `\n`
/// gains an extra backslash so the text can be restored.
pub fn escape_newlines(input: &str) -> String {
    input.replace("\\n", "\\\\n").replace('\n', "\\n")
}

pub fn restore_newlines(escaped: &str) -> String {
    let mut output = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('\\') {
        output.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("\\\\n") {
            output.push_str("\\n");
            rest = &tail[3..];
        } else if tail.starts_with("\\n") {
            output.push('\n');
            rest = &tail[2..];
        } else {
            output.push('\\');
            rest = &tail[1..];
        }
    }
    output.push_str(rest);
    output
}

fn resolve_encoding(label: &str) -> Result<&'static Encoding, PlaylistError> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| PlaylistError::Encoding(format!("不支持的编码: {label}")))
}

/// Writes the header followed by one row per record.
pub fn write_records<W: Write>(
    writer: &mut W,
    encoding: &str,
    records: &[VideoRecord],
) -> Result<usize, PlaylistError> {
    let enc = resolve_encoding(encoding)?;
    write_record(writer, enc, &FIELDNAMES)?;
    for record in records {
        write_record(writer, enc, &record.as_record())?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Creates (or truncates) `path` and writes the records into it.
pub fn write_records_to_path(
    path: &Path,
    encoding: &str,
    records: &[VideoRecord],
) -> Result<usize, PlaylistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, encoding, records)
}

fn write_record<W: Write>(
    writer: &mut W,
    encoding: &'static Encoding,
    record: &[&str],
) -> Result<(), PlaylistError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    csv_writer.write_record(record)?;
    csv_writer.flush()?;
    let buffer = csv_writer
        .into_inner()
        .map_err(|err| PlaylistError::Io(err.into_error()))?;
    if encoding == UTF_8 {
        writer.write_all(&buffer)?;
    } else {
        let utf8 =
            String::from_utf8(buffer).map_err(|err| PlaylistError::Encoding(err.to_string()))?;
        let (encoded, _, had_errors) = encoding.encode(&utf8);
        if had_errors {
            return Err(PlaylistError::Encoding("编码转换失败".into()));
        }
        writer.write_all(&encoded)?;
    }
    Ok(())
}
