//! MJPEG frame extractor
//!
//! Stateful byte-stream parser: raw chunks go in with [`FrameExtractor::push`],
//! encoded JPEG byte ranges come out of [`FrameExtractor::extract`].
//!
//! Two strategies are tried in order:
//!
//! 1. **Multipart**: when the content type declared a boundary, take the bytes
//!    between the first two boundary occurrences and locate the JPEG
//!    start/end markers inside that section.
//! 2. **Marker scan**: otherwise (or when fewer than two boundaries are
//!    buffered) scan the raw buffer for `FF D8 ... FF D9`.
//!
//! The buffer is bounded: past [`MAX_BUFFER_SIZE`] it is cut back to the last
//! start-of-image marker, or to the last [`TRIM_TAIL_SIZE`] bytes.

/// JPEG start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Buffer length that triggers trimming
pub const MAX_BUFFER_SIZE: usize = 500_000;

/// Bytes kept when no usable start marker exists
pub const TRIM_TAIL_SIZE: usize = 100_000;

/// Parse the multipart boundary token from a `Content-Type` value.
///
/// Leading dashes and surrounding quotes are stripped, so `boundary=--frame`,
/// `boundary="frame"` and `boundary=frame` yield the same token.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let value = content_type.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim())
    })?;

    let token = value
        .trim_matches('"')
        .split_whitespace()
        .next()?
        .trim_start_matches('-');
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`
pub(crate) fn find_pattern(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Find the last occurrence of `needle` in `haystack`
pub(crate) fn rfind_pattern(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Counters for diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    /// Frames found via boundary sections
    pub multipart_frames: u64,
    /// Frames found via raw marker scan
    pub scanned_frames: u64,
    /// Boundary sections that held no complete JPEG
    pub dropped_sections: u64,
    /// Times the buffer was cut back
    pub trims: u64,
}

impl ExtractorStats {
    /// Add counters from another extractor
    pub fn merge(&mut self, other: ExtractorStats) {
        self.multipart_frames += other.multipart_frames;
        self.scanned_frames += other.scanned_frames;
        self.dropped_sections += other.dropped_sections;
        self.trims += other.trims;
    }
}

/// Incremental MJPEG parser
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
    /// `--` + token, when the stream declared one
    delimiter: Option<Vec<u8>>,
    stats: ExtractorStats,
}

impl FrameExtractor {
    /// Create an extractor for a known boundary token (or none).
    pub fn new(boundary: Option<&str>) -> Self {
        let delimiter = boundary
            .map(|b| b.trim_start_matches('-'))
            .filter(|b| !b.is_empty())
            .map(|b| {
                let mut d = b"--".to_vec();
                d.extend_from_slice(b.as_bytes());
                d
            });
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            delimiter,
            stats: ExtractorStats::default(),
        }
    }

    /// Create an extractor from a stream's declared content type.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let boundary = content_type.and_then(parse_boundary);
        Self::new(boundary.as_deref())
    }

    /// Boundary token without the leading dashes
    pub fn boundary(&self) -> Option<&[u8]> {
        self.delimiter.as_deref().map(|d| &d[2..])
    }

    /// Append a chunk, then enforce the size bound.
    ///
    /// Zero-length chunks are ignored.
    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.trim();
    }

    /// Pull the next encoded JPEG out of the buffer, if one is complete.
    pub fn extract(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.extract_multipart() {
                Section::Frame(jpeg) => return Some(jpeg),
                // Section consumed without a frame; look at the next one
                Section::Dropped => continue,
                Section::Incomplete => break,
            }
        }
        self.extract_scan()
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    /// Drop all buffered bytes (boundary is kept).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn extract_multipart(&mut self) -> Section {
        let Some(delim) = self.delimiter.as_deref() else {
            return Section::Incomplete;
        };
        let Some(first) = find_pattern(&self.buffer, delim, 0) else {
            return Section::Incomplete;
        };
        let Some(second) = find_pattern(&self.buffer, delim, first + delim.len()) else {
            return Section::Incomplete;
        };

        let section = &self.buffer[first + delim.len()..second];
        let jpeg = find_pattern(section, &SOI, 0).and_then(|start| {
            find_pattern(section, &EOI, start + SOI.len())
                .map(|end| section[start..end + EOI.len()].to_vec())
        });

        // The second boundary opens the next section, so keep it
        self.buffer.drain(..second);

        match jpeg {
            Some(jpeg) => {
                self.stats.multipart_frames += 1;
                Section::Frame(jpeg)
            }
            None => {
                self.stats.dropped_sections += 1;
                tracing::debug!("Multipart section without a complete JPEG dropped");
                Section::Dropped
            }
        }
    }

    fn extract_scan(&mut self) -> Option<Vec<u8>> {
        let start = find_pattern(&self.buffer, &SOI, 0)?;
        let end = find_pattern(&self.buffer, &EOI, start + SOI.len())?;
        let stop = end + EOI.len();

        let jpeg = self.buffer[start..stop].to_vec();
        self.buffer.drain(..stop);
        self.stats.scanned_frames += 1;
        Some(jpeg)
    }

    fn trim(&mut self) {
        let len = self.buffer.len();
        if len <= MAX_BUFFER_SIZE {
            return;
        }

        let cut = match rfind_pattern(&self.buffer, &SOI) {
            Some(pos) if pos > 0 && len - pos <= MAX_BUFFER_SIZE => pos,
            _ => len - TRIM_TAIL_SIZE,
        };
        self.buffer.drain(..cut);
        self.stats.trims += 1;
        tracing::debug!(
            dropped = cut,
            kept = self.buffer.len(),
            "Extractor buffer trimmed"
        );
    }
}

enum Section {
    Frame(Vec<u8>),
    Dropped,
    Incomplete,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(fill: u8, len: usize) -> Vec<u8> {
        let mut v = SOI.to_vec();
        v.extend(std::iter::repeat_n(fill, len));
        v.extend_from_slice(&EOI);
        v
    }

    fn part(boundary: &str, jpeg: &[u8]) -> Vec<u8> {
        let mut v = format!(
            "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            boundary,
            jpeg.len()
        )
        .into_bytes();
        v.extend_from_slice(jpeg);
        v.extend_from_slice(b"\r\n");
        v
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace; boundary=frame"),
            Some("frame".to_string())
        );
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace;boundary=--myboundary"),
            Some("myboundary".to_string())
        );
        assert_eq!(
            parse_boundary("multipart/x-mixed-replace; boundary=\"abc123\"; charset=x"),
            Some("abc123".to_string())
        );
        assert_eq!(parse_boundary("image/jpeg"), None);
        assert_eq!(parse_boundary("multipart/x-mixed-replace; boundary=--"), None);
    }

    #[test]
    fn test_multipart_frames_in_order() {
        let a = fake_jpeg(0x11, 20);
        let b = fake_jpeg(0x22, 30);
        let mut ex = FrameExtractor::new(Some("frame"));

        let mut stream = part("frame", &a);
        stream.extend(part("frame", &b));
        stream.extend_from_slice(b"--frame\r\n");
        ex.push(&stream);

        assert_eq!(ex.extract(), Some(a));
        assert_eq!(ex.extract(), Some(b));
        assert_eq!(ex.extract(), None);
        assert_eq!(ex.stats().multipart_frames, 2);
        // The trailing boundary stays buffered for the next section
        assert!(ex.buffered() >= b"--frame".len());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let a = fake_jpeg(0x33, 100);
        let mut stream = part("frame", &a);
        stream.extend_from_slice(b"--frame\r\n");

        let mut ex = FrameExtractor::new(Some("frame"));
        let mut out = Vec::new();
        for chunk in stream.chunks(7) {
            ex.push(chunk);
            if let Some(jpeg) = ex.extract() {
                out.push(jpeg);
            }
        }
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn test_scan_without_boundary() {
        let a = fake_jpeg(0x44, 10);
        let b = fake_jpeg(0x55, 10);
        let mut ex = FrameExtractor::new(None);

        let mut stream = b"garbage".to_vec();
        stream.extend_from_slice(&a);
        stream.extend_from_slice(b"\x00\x01");
        stream.extend_from_slice(&b);
        ex.push(&stream);

        assert_eq!(ex.extract(), Some(a));
        assert_eq!(ex.extract(), Some(b));
        assert_eq!(ex.extract(), None);
        assert_eq!(ex.stats().scanned_frames, 2);
    }

    #[test]
    fn test_end_marker_before_start_is_ignored() {
        let mut ex = FrameExtractor::new(None);
        ex.push(&[0xFF, 0xD9, 0x00, 0xFF, 0xD8, 0x01]);
        assert_eq!(ex.extract(), None);
        ex.push(&[0x02, 0xFF, 0xD9]);
        assert_eq!(ex.extract(), Some(vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]));
    }

    #[test]
    fn test_section_without_jpeg_is_dropped() {
        let a = fake_jpeg(0x66, 10);
        let mut stream = b"--frame\r\nContent-Type: text/plain\r\n\r\nhello\r\n".to_vec();
        stream.extend(part("frame", &a));
        stream.extend_from_slice(b"--frame");

        let mut ex = FrameExtractor::new(Some("frame"));
        ex.push(&stream);
        assert_eq!(ex.extract(), Some(a));
        assert_eq!(ex.stats().dropped_sections, 1);
    }

    #[test]
    fn test_jpeg_split_across_boundary_is_not_stitched() {
        let whole = fake_jpeg(0x44, 40);
        let (head, tail) = whole.split_at(20);
        let next = fake_jpeg(0x77, 12);

        let mut stream = b"--frame\r\n\r\n".to_vec();
        stream.extend_from_slice(head);
        stream.extend_from_slice(b"\r\n--frame\r\n\r\n");
        stream.extend_from_slice(tail);
        stream.extend_from_slice(b"\r\n");
        stream.extend(part("frame", &next));
        stream.extend_from_slice(b"--frame--\r\n");

        let mut ex = FrameExtractor::new(Some("frame"));
        ex.push(&stream);
        assert_eq!(ex.extract(), Some(next.clone()));
        assert_eq!(ex.extract(), None);
        let stats = ex.stats();
        assert_eq!(stats.dropped_sections, 2);
        assert_eq!(stats.multipart_frames, 1);
        assert_eq!(stats.scanned_frames, 0);

        // Same result when the halves arrive one byte at a time
        let mut ex = FrameExtractor::new(Some("frame"));
        let mut frames = Vec::new();
        for byte in &stream {
            ex.push(std::slice::from_ref(byte));
            while let Some(frame) = ex.extract() {
                frames.push(frame);
            }
        }
        assert_eq!(frames, vec![next]);
        assert_eq!(ex.stats().dropped_sections, 2);
    }

    #[test]
    fn test_zero_length_chunk_ignored() {
        let mut ex = FrameExtractor::new(None);
        ex.push(&[]);
        assert_eq!(ex.buffered(), 0);
        assert_eq!(ex.extract(), None);
    }

    #[test]
    fn test_trim_keeps_last_start_marker() {
        let mut ex = FrameExtractor::new(None);
        ex.push(&vec![0u8; MAX_BUFFER_SIZE - 10]);
        // Incomplete frame straddles the threshold
        let mut tail = SOI.to_vec();
        tail.extend(vec![7u8; 50]);
        ex.push(&tail);

        assert_eq!(ex.buffered(), 52);
        assert_eq!(ex.stats().trims, 1);
        ex.push(&EOI);
        assert_eq!(ex.extract().map(|j| j.len()), Some(54));
    }

    #[test]
    fn test_trim_without_marker_keeps_tail() {
        let mut ex = FrameExtractor::new(None);
        ex.push(&vec![0xAB; MAX_BUFFER_SIZE + 1]);
        assert_eq!(ex.buffered(), TRIM_TAIL_SIZE);
    }

    #[test]
    fn test_trim_with_marker_at_front_keeps_tail() {
        let mut ex = FrameExtractor::new(None);
        let mut data = SOI.to_vec();
        data.extend(vec![0x10; MAX_BUFFER_SIZE]);
        ex.push(&data);
        assert_eq!(ex.buffered(), TRIM_TAIL_SIZE);
    }

    #[test]
    fn test_clear_keeps_boundary() {
        let mut ex = FrameExtractor::from_content_type(Some(
            "multipart/x-mixed-replace; boundary=--camframe",
        ));
        ex.push(b"--camframe\r\n");
        ex.clear();
        assert_eq!(ex.buffered(), 0);
        assert_eq!(ex.boundary(), Some(&b"camframe"[..]));
    }
}
