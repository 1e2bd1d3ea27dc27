//! JPEG frame extraction from an MJPEG byte stream
//!
//! MJPEG cameras emit a sequence of complete JPEG images, usually wrapped in
//! multipart boundaries and part headers. Every JPEG image is delimited by
//! two-byte markers:
//!
//! ```text
//! +-------+----------------------+-------+
//! | FF D8 | entropy-coded data.. | FF D9 |
//! +-------+----------------------+-------+
//!   SOI     (part headers and      EOI
//!            boundaries appear
//!            between images)
//! ```
//!
//! The demuxer scans purely on those markers, so multipart boundaries, part
//! headers, and any garbage from a mid-frame connect are skipped without ever
//! parsing them. It carries state across pushes, which makes the emitted frame
//! sequence independent of how the transport happened to slice the stream.

use bytes::{Buf, Bytes, BytesMut};

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Stateful splitter of a byte stream into complete JPEG frames
///
/// Purely computational: `push` appends a chunk and returns every frame that
/// became complete, in stream order. Incomplete data stays buffered for the
/// next push. There is no cap on the buffered tail; a source that never closes
/// a frame grows the accumulator until the session is torn down.
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    /// Bytes received but not yet emitted as part of a frame
    acc: BytesMut,
}

impl FrameDemuxer {
    /// Create an empty demuxer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and extract every frame completed by it
    ///
    /// Returns zero or more frames, markers included. Frames are cheap
    /// reference-counted slices of the internal buffer, not copies.
    ///
    /// Recovery rules:
    /// - An end marker with no start marker before it belongs to a frame whose
    ///   beginning was never seen (mid-stream connect or upstream desync);
    ///   everything up to the next start marker is discarded.
    /// - Bytes before a start marker (multipart headers, boundaries) are
    ///   dropped when the frame they precede is emitted.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.acc.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(start) = find_marker(&self.acc, &JPEG_SOI) else {
                break;
            };
            let Some(end) = find_marker(&self.acc, &JPEG_EOI) else {
                break;
            };

            if end < start {
                // Stale tail of a frame we never saw the start of
                self.acc.advance(start);
                continue;
            }

            // Take everything through the end marker, then peel off the
            // leading non-frame bytes
            let mut head = self.acc.split_to(end + JPEG_EOI.len());
            frames.push(head.split_off(start).freeze());
        }

        frames
    }

    /// Number of buffered bytes not yet part of an emitted frame
    pub fn pending(&self) -> usize {
        self.acc.len()
    }

    /// Buffered bytes not yet part of an emitted frame
    pub fn pending_bytes(&self) -> &[u8] {
        &self.acc
    }

    /// Drop all buffered bytes
    ///
    /// Called on session teardown so a later session never resumes into a
    /// stale partial frame.
    pub fn reset(&mut self) {
        self.acc.clear();
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a JPEG-shaped frame: SOI + `interior` filler bytes + EOI
    fn fake_jpeg(interior: usize) -> Vec<u8> {
        let mut frame = Vec::with_capacity(interior + 4);
        frame.extend_from_slice(&JPEG_SOI);
        frame.extend(std::iter::repeat(0xAB).take(interior));
        frame.extend_from_slice(&JPEG_EOI);
        frame
    }

    #[test]
    fn test_single_frame_one_push() {
        let mut demux = FrameDemuxer::new();
        let frame = fake_jpeg(10);

        let out = demux.push(&frame);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
        assert_eq!(demux.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut demux = FrameDemuxer::new();
        let frame = fake_jpeg(20);

        // Split right inside the interior
        assert!(demux.push(&frame[..7]).is_empty());
        assert!(demux.pending() > 0);

        let out = demux.push(&frame[7..]);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
    }

    #[test]
    fn test_split_inside_marker() {
        let mut demux = FrameDemuxer::new();
        let frame = fake_jpeg(8);

        // Split between the two bytes of the SOI marker
        assert!(demux.push(&frame[..1]).is_empty());
        let out = demux.push(&frame[1..]);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
    }

    #[test]
    fn test_garbage_prefix_two_frames_and_tail() {
        // Realistic mid-stream connect: partial old frame data, then two
        // complete frames, then the beginning of a third
        let frame_a = fake_jpeg(98); // 102 bytes with markers
        let frame_b = fake_jpeg(48); // 52 bytes with markers

        let mut stream = Vec::new();
        stream.extend_from_slice(b"garbage");
        stream.extend_from_slice(&frame_a);
        stream.extend_from_slice(&frame_b);
        stream.extend_from_slice(b"tail");

        // Three arbitrary deliveries, cutting inside both frames
        let mut demux = FrameDemuxer::new();
        let mut frames = Vec::new();
        frames.extend(demux.push(&stream[..40]));
        frames.extend(demux.push(&stream[40..130]));
        frames.extend(demux.push(&stream[130..]));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 102);
        assert_eq!(frames[1].len(), 52);
        assert_eq!(&frames[0][..], &frame_a[..]);
        assert_eq!(&frames[1][..], &frame_b[..]);

        // The partial third frame stays buffered
        assert_eq!(demux.pending_bytes(), b"tail");
    }

    #[test]
    fn test_chunk_boundaries_are_invisible() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n");
        stream.extend_from_slice(&fake_jpeg(33));
        stream.extend_from_slice(b"\r\n--boundary\r\n");
        stream.extend_from_slice(&fake_jpeg(57));
        stream.extend_from_slice(&fake_jpeg(5));

        // One-shot delivery
        let mut one_shot = FrameDemuxer::new();
        let expected = one_shot.push(&stream);
        assert_eq!(expected.len(), 3);

        // Byte-by-byte delivery
        let mut trickle = FrameDemuxer::new();
        let mut got = Vec::new();
        for b in &stream {
            got.extend(trickle.push(std::slice::from_ref(b)));
        }
        assert_eq!(got, expected);

        // Uneven three-way split
        let mut split = FrameDemuxer::new();
        let mut got = Vec::new();
        got.extend(split.push(&stream[..11]));
        got.extend(split.push(&stream[11..61]));
        got.extend(split.push(&stream[61..]));
        assert_eq!(got, expected);
    }

    #[test]
    fn test_stray_end_marker_discarded() {
        let mut demux = FrameDemuxer::new();

        // End marker with no start in sight: nothing to emit, bytes buffered
        let mut stale = Vec::new();
        stale.extend_from_slice(&[0x01, 0x02]);
        stale.extend_from_slice(&JPEG_EOI);
        assert!(demux.push(&stale).is_empty());
        assert_eq!(demux.pending(), 4);

        // Once a real frame arrives, the stale tail is dropped and only the
        // complete frame comes out
        let frame = fake_jpeg(6);
        let out = demux.push(&frame);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
        assert_eq!(demux.pending(), 0);
    }

    #[test]
    fn test_no_markers_stays_pending() {
        let mut demux = FrameDemuxer::new();

        assert!(demux.push(b"no jpeg here").is_empty());
        assert_eq!(demux.pending(), 12);
    }

    #[test]
    fn test_start_without_end_stays_pending() {
        let mut demux = FrameDemuxer::new();
        let frame = fake_jpeg(100);
        let partial = &frame[..frame.len() - 2];

        assert!(demux.push(partial).is_empty());
        assert_eq!(demux.pending(), partial.len());

        // Closing marker completes it
        let out = demux.push(&JPEG_EOI);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut demux = FrameDemuxer::new();
        let mut stream = Vec::new();
        for i in 0..5 {
            stream.extend_from_slice(&fake_jpeg(i * 3));
        }

        let out = demux.push(&stream);

        assert_eq!(out.len(), 5);
        assert_eq!(demux.pending(), 0);
        for (i, frame) in out.iter().enumerate() {
            assert_eq!(frame.len(), i * 3 + 4);
        }
    }

    #[test]
    fn test_minimal_frame() {
        // SOI immediately followed by EOI is still a frame
        let mut demux = FrameDemuxer::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&JPEG_SOI);
        stream.extend_from_slice(&JPEG_EOI);

        let out = demux.push(&stream);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 4);
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut demux = FrameDemuxer::new();
        demux.push(&JPEG_SOI);
        demux.push(&[0x10, 0x20, 0x30]);
        assert!(demux.pending() > 0);

        demux.reset();

        assert_eq!(demux.pending(), 0);

        // A frame pushed after reset comes out whole
        let frame = fake_jpeg(12);
        let out = demux.push(&frame);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &frame[..]);
    }
}
