//! KWZ file header (`KFH`) parsing

use super::sections::SectionMap;
use super::{KwzDecoder, KWZ_FRAMERATES, KWZ_LAYER_COUNT};
use crate::common::{ensure_input, AuthorInfo, FlipnoteRegion};
use crate::ppm::header::read_packed_filename;
use crate::ppm::{is_ppm_fsid, ppm_fsid_region};
use crate::stream::ByteStream;
use crate::Result;

/// Offset of the timestamps from the start of the `KFH` section (header and CRC skipped)
const KFH_META_OFFSET: usize = 12;

/// Offset of the playback fields from the start of the `KFH` section
const KFH_PLAYBACK_OFFSET: usize = 0xCC;

/// Offset of the current author ID from the start of the `KFH` section
const KFH_CURRENT_FSID_OFFSET: usize = KFH_META_OFFSET + 12 + 2 * FSID_SIZE;

/// Size of a stored author ID
pub(super) const FSID_SIZE: usize = 10;
const USERNAME_CHARS: usize = 11;
const FILENAME_SIZE: usize = 28;

/// Region an author ID was registered in
///
/// DSi-era IDs keep their PPM region rules. Native IDs carry the region in
/// their first hex digit.
pub fn kwz_fsid_region(fsid: &str) -> FlipnoteRegion {
    if is_ppm_fsid(fsid) {
        return ppm_fsid_region(fsid);
    }
    match fsid.as_bytes().first() {
        Some(b'0') => FlipnoteRegion::Jpn,
        Some(b'1') => FlipnoteRegion::Usa,
        Some(b'2') => FlipnoteRegion::Eur,
        _ => FlipnoteRegion::Unknown,
    }
}

/// Guess whether a KWZ file is a DSi Library conversion
///
/// Converted notes keep the original DSi author ID, so the current author
/// ID read in the DSi layout passes [`is_ppm_fsid`]. This is a heuristic and
/// is never applied automatically; pass the answer to
/// [`DecoderSettings::with_dsi_library_note`](crate::DecoderSettings::with_dsi_library_note).
pub fn looks_like_dsi_library_note(bytes: &[u8]) -> bool {
    let Ok(sections) = SectionMap::discover(bytes) else {
        return false;
    };
    let Some(kfh) = sections.get(b"KFH") else {
        return false;
    };
    let start = kfh.offset + KFH_CURRENT_FSID_OFFSET;
    if start + FSID_SIZE > kfh.end() {
        return false;
    }
    bytes
        .get(start..start + FSID_SIZE)
        .is_some_and(|fsid| is_ppm_fsid(&format_fsid(fsid, true)))
}

/// Read a 10-byte author ID
///
/// Native IDs format as `xxxx-xxxx-xxxx-xxxxxx`; DSi Library notes store a
/// byte-reversed DSi ID with one padding byte at each end.
fn read_fsid(stream: &mut ByteStream, dsi_layout: bool) -> Result<String> {
    Ok(format_fsid(stream.read_bytes(FSID_SIZE)?, dsi_layout))
}

/// Format the 10 raw bytes of an author ID
pub(super) fn format_fsid(bytes: &[u8], dsi_layout: bool) -> String {
    if dsi_layout {
        return bytes
            .iter()
            .rev()
            .skip(1)
            .take(8)
            .map(|b| format!("{b:02X}"))
            .collect();
    }
    let hex: String = bytes.iter().take(9).map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}",
        &hex[0..4],
        &hex[4..8],
        &hex[8..12],
        &hex[12..18]
    )
}

/// Read a 28-byte filename field
///
/// Converted DSi notes sometimes hold a packed PPM filename instead of the
/// 28 ASCII characters, which shows up as a short NUL-terminated read.
fn read_filename(stream: &mut ByteStream) -> Result<String> {
    let start = stream.position();
    let chars = stream.read_chars(FILENAME_SIZE)?;
    if chars.chars().count() == FILENAME_SIZE {
        return Ok(chars);
    }
    stream.seek_to(start)?;
    let filename = read_packed_filename(stream)?;
    stream.seek_to(start + FILENAME_SIZE)?;
    Ok(filename)
}

fn author(username: String, fsid: String, filename: String) -> AuthorInfo {
    AuthorInfo {
        region: Some(kwz_fsid_region(&fsid)),
        username,
        fsid,
        filename: Some(filename),
    }
}

/// Fields shared by the full and quick meta readers
struct PlaybackFields {
    frame_count: usize,
    thumb_index: usize,
    flags: u16,
    frame_speed: u8,
    layer_flags: u8,
}

fn read_playback_fields(stream: &mut ByteStream) -> Result<PlaybackFields> {
    let fields = PlaybackFields {
        frame_count: stream.read_u16()? as usize,
        thumb_index: stream.read_u16()? as usize,
        flags: stream.read_u16()?,
        frame_speed: stream.read_u8()?,
        layer_flags: stream.read_u8()?,
    };
    ensure_input!(fields.frame_count >= 1, "note has no frames");
    ensure_input!(
        (fields.frame_speed as usize) < KWZ_FRAMERATES.len(),
        "invalid frame speed {}",
        fields.frame_speed
    );
    Ok(fields)
}

impl KwzDecoder {
    fn apply_playback_fields(&mut self, fields: &PlaybackFields) {
        self.frame_count = fields.frame_count;
        self.thumb_frame_index = fields.thumb_index;
        self.frame_speed = fields.frame_speed;
        self.framerate = KWZ_FRAMERATES[fields.frame_speed as usize];
        self.bgm_speed = fields.frame_speed;
        self.bgm_framerate = self.framerate;

        let mut visibility = [true; KWZ_LAYER_COUNT];
        for (layer, visible) in visibility.iter_mut().enumerate() {
            *visible = fields.layer_flags & (1 << layer) == 0;
        }
        self.layer_visibility = visibility;

        self.meta.lock = fields.flags & 0x1 != 0;
        self.meta.is_loop = fields.flags & 0x2 != 0;
        self.meta.thumb_index = fields.thumb_index;
    }

    /// Read only the playback block near the end of `KFH`
    pub(super) fn read_meta_quick(&mut self) -> Result<()> {
        let kfh = self.sections.require(b"KFH")?;
        self.stream.seek_to(kfh.offset + KFH_PLAYBACK_OFFSET)?;
        let fields = read_playback_fields(&mut self.stream)?;
        self.apply_playback_fields(&fields);
        Ok(())
    }

    /// Read every `KFH` field: timestamps, authors, filenames and playback block
    pub(super) fn read_meta(&mut self) -> Result<()> {
        let kfh = self.sections.require(b"KFH")?;
        let dsi_layout = self.is_dsi_library_note;
        let stream = &mut self.stream;
        stream.seek_to(kfh.offset + KFH_META_OFFSET)?;

        let creation_timestamp = stream.read_u32()?;
        let modified_timestamp = stream.read_u32()?;
        let app_version = stream.read_u32()?;
        let root_fsid = read_fsid(stream, dsi_layout)?;
        let parent_fsid = read_fsid(stream, dsi_layout)?;
        let current_fsid = read_fsid(stream, dsi_layout)?;
        let root_name = stream.read_wide_chars(USERNAME_CHARS)?;
        let parent_name = stream.read_wide_chars(USERNAME_CHARS)?;
        let current_name = stream.read_wide_chars(USERNAME_CHARS)?;
        let root = author(root_name, root_fsid, read_filename(stream)?);
        let parent = author(parent_name, parent_fsid, read_filename(stream)?);
        let current = author(current_name, current_fsid, read_filename(stream)?);
        let fields = read_playback_fields(stream)?;
        self.apply_playback_fields(&fields);

        let meta = &mut self.meta;
        meta.is_spinoff = current.fsid != parent.fsid || current.fsid != root.fsid;
        meta.timestamp = modified_timestamp;
        meta.creation_timestamp = Some(creation_timestamp);
        meta.root = root;
        meta.parent = parent;
        meta.current = current;

        log::debug!(
            "KWZ meta: app version {app_version:#x}, current author {:?} ({}), spinoff: {}",
            meta.current.username,
            meta.current.fsid,
            meta.is_spinoff
        );
        Ok(())
    }
}
