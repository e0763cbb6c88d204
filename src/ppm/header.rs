//! PPM header, animation header, sound header and meta parsing

use super::{
    PpmDecoder, ANIMATION_HEADER_OFFSET, FRAME_OFFSET_TABLE_OFFSET, HEADER_FRAME_DATA_LENGTH,
    META_OFFSET, PLAYBACK_FLAGS_OFFSET, PPM_FRAMERATES, SOUND_HEADER_SIZE, TIMESTAMP_OFFSET,
};
use crate::common::{ensure_input, AudioTrackInfo, AuthorInfo, FlipnoteRegion};
use crate::stream::ByteStream;
use crate::Result;

/// Author ID used by an official promotional note that does not follow the
/// usual ID layout
pub const PPM_FSID_SPECIAL_CASE: &str = "14E494E35A443235";

/// Whether `fsid` looks like a Flipnote Studio (DSi) author ID
///
/// IDs are 16 upper-case hex digits, start with 0, 1, 5 or 9 and have a `0`
/// as their eighth digit.
pub fn is_ppm_fsid(fsid: &str) -> bool {
    if fsid == PPM_FSID_SPECIAL_CASE {
        return true;
    }
    let bytes = fsid.as_bytes();
    bytes.len() == 16
        && bytes
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
        && matches!(bytes[0], b'0' | b'1' | b'5' | b'9')
        && bytes[7] == b'0'
}

/// Region an author ID was registered in
pub fn ppm_fsid_region(fsid: &str) -> FlipnoteRegion {
    if fsid == PPM_FSID_SPECIAL_CASE {
        return FlipnoteRegion::Jpn;
    }
    match fsid.as_bytes().first() {
        Some(b'0') | Some(b'1') => FlipnoteRegion::Jpn,
        Some(b'5') => FlipnoteRegion::Usa,
        Some(b'9') => FlipnoteRegion::Eur,
        _ => FlipnoteRegion::Unknown,
    }
}

/// Packed filename: 3-byte MAC suffix, 13 random characters, edit counter
pub(crate) fn read_packed_filename(stream: &mut ByteStream) -> Result<String> {
    let mac = stream.read_hex(3, false)?;
    let random = stream.read_chars(13)?;
    let edits = stream.read_u16()?;
    Ok(format!("{mac}_{random}_{edits:03}"))
}

fn author(username: String, fsid: String, filename: Option<String>) -> AuthorInfo {
    let region = Some(ppm_fsid_region(&fsid));
    AuthorInfo {
        username,
        fsid,
        filename,
        region,
    }
}

impl PpmDecoder {
    pub(super) fn read_header(&mut self) -> Result<()> {
        self.stream.seek_to(HEADER_FRAME_DATA_LENGTH)?;
        self.frame_data_length = self.stream.read_u32()? as usize;
        self.sound_data_length = self.stream.read_u32()? as usize;
        self.frame_count = self.stream.read_u16()? as usize + 1;
        self.version = self.stream.read_u16()?;
        Ok(())
    }

    pub(super) fn read_animation_header(&mut self) -> Result<()> {
        self.stream.seek_to(ANIMATION_HEADER_OFFSET)?;
        let table_length = self.stream.read_u16()? as usize;
        let offset_count = table_length / 4;
        ensure_input!(
            offset_count <= self.frame_count,
            "frame offset table has {offset_count} entries for {} frames",
            self.frame_count
        );
        ensure_input!(
            offset_count == self.frame_count,
            "frame offset table is missing {} frames",
            self.frame_count - offset_count
        );

        let frame_data_start = FRAME_OFFSET_TABLE_OFFSET + table_length;
        let frame_data_end = ANIMATION_HEADER_OFFSET + self.frame_data_length;
        let file_length = self.stream.len();
        self.stream.seek_to(FRAME_OFFSET_TABLE_OFFSET)?;
        self.frame_offsets = (0..offset_count)
            .map(|_| {
                let offset = frame_data_start + self.stream.read_u32()? as usize;
                ensure_input!(
                    offset < frame_data_end.min(file_length),
                    "frame offset {offset:#x} lies outside the frame data"
                );
                Ok(offset)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    pub(super) fn read_sound_header(&mut self) -> Result<()> {
        // frame data, then one sound effect flag byte per frame, padded to 4 bytes
        let mut offset = ANIMATION_HEADER_OFFSET + self.frame_data_length + self.frame_count;
        offset = offset.next_multiple_of(4);
        self.sound_header_offset = offset;

        self.stream.seek_to(offset)?;
        let lengths = [
            self.stream.read_u32()? as usize,
            self.stream.read_u32()? as usize,
            self.stream.read_u32()? as usize,
            self.stream.read_u32()? as usize,
        ];
        let frame_speed = self.stream.read_u8()?;
        let bgm_speed = self.stream.read_u8()?;
        ensure_input!(
            frame_speed <= 8 && bgm_speed <= 8,
            "invalid speed bytes {frame_speed}/{bgm_speed}"
        );
        self.frame_speed = 8 - frame_speed;
        self.bgm_speed = 8 - bgm_speed;
        self.framerate = PPM_FRAMERATES[self.frame_speed as usize];
        self.bgm_framerate = PPM_FRAMERATES[self.bgm_speed as usize];

        let mut track_offset = offset + SOUND_HEADER_SIZE;
        for (info, length) in self.sound_meta.iter_mut().zip(lengths) {
            *info = AudioTrackInfo {
                offset: track_offset,
                length,
            };
            track_offset += length;
        }
        ensure_input!(
            track_offset <= self.stream.len(),
            "audio tracks end at {track_offset:#x}, past the end of the file"
        );
        Ok(())
    }

    pub(super) fn read_meta(&mut self) -> Result<()> {
        let stream = &mut self.stream;
        stream.seek_to(META_OFFSET)?;
        let lock = stream.read_u16()?;
        let thumb_index = stream.read_u16()? as usize;
        let root_name = stream.read_wide_chars(11)?;
        let parent_name = stream.read_wide_chars(11)?;
        let current_name = stream.read_wide_chars(11)?;
        let parent_fsid = stream.read_hex(8, true)?;
        let current_fsid = stream.read_hex(8, true)?;
        let parent_filename = read_packed_filename(stream)?;
        let current_filename = read_packed_filename(stream)?;
        let root_fsid = stream.read_hex(8, true)?;

        stream.seek_to(TIMESTAMP_OFFSET)?;
        let timestamp = stream.read_u32()?;

        stream.seek_to(PLAYBACK_FLAGS_OFFSET)?;
        let playback_flags = stream.read_u16()?;

        self.thumb_frame_index = thumb_index;
        self.layer_visibility = [playback_flags & 0x10 == 0, playback_flags & 0x20 == 0];

        let meta = &mut self.meta;
        meta.lock = lock == 1;
        meta.is_loop = (playback_flags >> 1) & 0x1 == 1;
        meta.is_spinoff = current_fsid != parent_fsid || current_fsid != root_fsid;
        meta.thumb_index = thumb_index;
        meta.timestamp = timestamp;
        meta.root = author(root_name, root_fsid, None);
        meta.parent = author(parent_name, parent_fsid, Some(parent_filename));
        meta.current = author(current_name, current_fsid, Some(current_filename));

        log::debug!(
            "PPM meta: current author {:?} ({}), spinoff: {}",
            meta.current.username,
            meta.current.fsid,
            meta.is_spinoff
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsid_validation() {
        assert!(is_ppm_fsid("5A7B3C400E1F2A3B"));
        assert!(is_ppm_fsid("9000000000000000"));
        assert!(is_ppm_fsid(PPM_FSID_SPECIAL_CASE));
        // wrong leading digit
        assert!(!is_ppm_fsid("2A7B3C400E1F2A3B"));
        // eighth digit must be 0
        assert!(!is_ppm_fsid("5A7B3C411E1F2A3B"));
        // lower case and short ids
        assert!(!is_ppm_fsid("5a7b3c400e1f2a3b"));
        assert!(!is_ppm_fsid("5A7B3C4D0E"));
    }

    #[test]
    fn test_fsid_region() {
        assert_eq!(ppm_fsid_region("0123456701234567"), FlipnoteRegion::Jpn);
        assert_eq!(ppm_fsid_region("1123456701234567"), FlipnoteRegion::Jpn);
        assert_eq!(ppm_fsid_region("5123456701234567"), FlipnoteRegion::Usa);
        assert_eq!(ppm_fsid_region("9123456701234567"), FlipnoteRegion::Eur);
        assert_eq!(ppm_fsid_region("7123456701234567"), FlipnoteRegion::Unknown);
        assert_eq!(ppm_fsid_region(""), FlipnoteRegion::Unknown);
        assert_eq!(ppm_fsid_region(PPM_FSID_SPECIAL_CASE), FlipnoteRegion::Jpn);
    }

    #[test]
    fn test_packed_filename() {
        let mut data = vec![0xF7, 0x8A, 0x3C];
        data.extend_from_slice(b"0123456789ABC");
        data.extend_from_slice(&7u16.to_le_bytes());
        let mut stream = ByteStream::new(data);
        assert_eq!(
            read_packed_filename(&mut stream).unwrap(),
            "F78A3C_0123456789ABC_007"
        );
    }
}
