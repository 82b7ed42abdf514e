//! Audio placement policy for the recorder.
//!
//! Chunks arrive with their own timestamps. The timeline keeps a cursor at the
//! end of the audio written so far and decides, per chunk, whether to fill a
//! gap with silence, drop a chunk that is already covered, or trim a partial
//! overlap. The cursor never moves backwards.

use crate::models::audio_models::{AudioChunk, AudioFormat};

/// Longest single silence sample, 50 ms in 100 ns ticks.
pub const MAX_SILENCE_PIECE: i64 = 500_000;

/// Upper bound on silence samples emitted for one gap (5 s of silence).
pub const MAX_SILENCE_PIECES: usize = 100;

/// Chunks consumed per drain pass.
pub const MAX_CHUNKS_PER_PASS: usize = 32;

/// One write decided by [`AudioTimeline::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Write `frames` of silence at `ts`.
    Silence { ts: i64, duration: i64, frames: u64 },
    /// Write the chunk's PCM starting at byte `offset`, at `ts`.
    Audio { ts: i64, duration: i64, offset: usize },
}

#[derive(Debug, Clone)]
pub struct AudioTimeline {
    format: AudioFormat,
    cursor: i64,
    chunks: u64,
    skipped: u64,
    silence_pieces: u64,
}

impl AudioTimeline {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            cursor: 0,
            chunks: 0,
            skipped: 0,
            silence_pieces: 0,
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// End of the audio placed so far, in 100 ns ticks.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn silence_pieces(&self) -> u64 {
        self.silence_pieces
    }

    /// Decide how `chunk` lands on the timeline and advance the cursor.
    ///
    /// Returns the writes to perform in order; empty when the chunk is
    /// skipped.
    pub fn place(&mut self, chunk: &AudioChunk) -> Vec<Placement> {
        let mut writes = Vec::new();
        let block = self.format.block_align().max(1);

        if chunk.duration <= 0 || chunk.pcm.len() < block || chunk.end() <= self.cursor {
            self.skipped += 1;
            return writes;
        }

        if chunk.ts > self.cursor {
            self.fill_gap(chunk.ts, &mut writes);
        }

        let mut ts = chunk.ts;
        let mut offset = 0usize;
        if ts < self.cursor {
            // Partial overlap: drop the covered prefix on a frame boundary.
            let covered = self.cursor - ts;
            let frames = ceil_frames(&self.format, covered);
            offset = (frames as usize).saturating_mul(block);
            if offset >= chunk.pcm.len() {
                self.skipped += 1;
                return writes;
            }
            ts = self.cursor;
        }

        let end = chunk.end();
        writes.push(Placement::Audio {
            ts,
            duration: end - ts,
            offset,
        });
        self.chunks += 1;
        self.cursor = self.cursor.max(end);
        writes
    }

    fn fill_gap(&mut self, until: i64, writes: &mut Vec<Placement>) {
        let mut pieces = 0;
        while self.cursor < until && pieces < MAX_SILENCE_PIECES {
            let duration = (until - self.cursor).min(MAX_SILENCE_PIECE);
            let frames = self.format.ticks_to_frames(duration);
            if frames == 0 {
                break;
            }
            writes.push(Placement::Silence {
                ts: self.cursor,
                duration,
                frames,
            });
            self.cursor += duration;
            self.silence_pieces += 1;
            pieces += 1;
        }
        if self.cursor < until {
            // Remaining gap (sub-frame or beyond the piece bound) is left open.
            self.cursor = until;
        }
    }
}

fn ceil_frames(format: &AudioFormat, ticks: i64) -> u64 {
    let frames = format.ticks_to_frames(ticks);
    if format.frames_to_ticks(frames) < ticks {
        frames + 1
    } else {
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::TICKS_PER_SECOND;

    const TEN_MS: i64 = 100_000;

    fn fmt() -> AudioFormat {
        AudioFormat::pcm16(48000, 2)
    }

    fn chunk(ts: i64, duration: i64) -> AudioChunk {
        let frames = fmt().ticks_to_frames(duration) as usize;
        AudioChunk {
            ts,
            duration,
            pcm: vec![1; frames * 4],
        }
    }

    #[test]
    fn contiguous_chunks_are_written_in_place() {
        let mut timeline = AudioTimeline::new(fmt());
        assert_eq!(
            timeline.place(&chunk(0, TEN_MS)),
            vec![Placement::Audio { ts: 0, duration: TEN_MS, offset: 0 }]
        );
        assert_eq!(
            timeline.place(&chunk(TEN_MS, TEN_MS)),
            vec![Placement::Audio { ts: TEN_MS, duration: TEN_MS, offset: 0 }]
        );
        assert_eq!(timeline.cursor(), 2 * TEN_MS);
        assert_eq!(timeline.chunks(), 2);
    }

    #[test]
    fn gaps_are_filled_with_bounded_silence_pieces() {
        let mut timeline = AudioTimeline::new(fmt());
        timeline.place(&chunk(0, TEN_MS));

        // 120 ms gap: 50 + 50 + 20.
        let writes = timeline.place(&chunk(13 * TEN_MS, TEN_MS));
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], Placement::Silence { ts: TEN_MS, duration: MAX_SILENCE_PIECE, frames: 2400 });
        assert_eq!(writes[1], Placement::Silence { ts: 6 * TEN_MS, duration: MAX_SILENCE_PIECE, frames: 2400 });
        assert_eq!(writes[2], Placement::Silence { ts: 11 * TEN_MS, duration: 2 * TEN_MS, frames: 960 });
        assert_eq!(writes[3], Placement::Audio { ts: 13 * TEN_MS, duration: TEN_MS, offset: 0 });
        assert_eq!(timeline.silence_pieces(), 3);
        for w in &writes {
            if let Placement::Silence { duration, .. } = w {
                assert!(*duration <= MAX_SILENCE_PIECE);
            }
        }
    }

    #[test]
    fn huge_gap_is_capped() {
        let mut timeline = AudioTimeline::new(fmt());
        let far = 60 * TICKS_PER_SECOND;
        let writes = timeline.place(&chunk(far, TEN_MS));
        let silence = writes.iter().filter(|w| matches!(w, Placement::Silence { .. })).count();
        assert_eq!(silence, MAX_SILENCE_PIECES);
        assert_eq!(writes.last(), Some(&Placement::Audio { ts: far, duration: TEN_MS, offset: 0 }));
        assert_eq!(timeline.cursor(), far + TEN_MS);
    }

    #[test]
    fn covered_chunks_are_skipped() {
        let mut timeline = AudioTimeline::new(fmt());
        timeline.place(&chunk(0, 3 * TEN_MS));
        assert!(timeline.place(&chunk(TEN_MS, TEN_MS)).is_empty());
        assert!(timeline.place(&chunk(2 * TEN_MS, TEN_MS)).is_empty());
        assert_eq!(timeline.skipped(), 2);
        assert_eq!(timeline.cursor(), 3 * TEN_MS);
    }

    #[test]
    fn partial_overlap_trims_prefix() {
        let mut timeline = AudioTimeline::new(fmt());
        timeline.place(&chunk(0, 2 * TEN_MS));

        let writes = timeline.place(&chunk(TEN_MS, 2 * TEN_MS));
        // 10 ms at 48 kHz stereo PCM16 = 480 frames * 4 bytes.
        assert_eq!(
            writes,
            vec![Placement::Audio { ts: 2 * TEN_MS, duration: TEN_MS, offset: 1920 }]
        );
        assert_eq!(timeline.cursor(), 3 * TEN_MS);
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let mut timeline = AudioTimeline::new(fmt());
        let empty = AudioChunk { ts: 0, duration: TEN_MS, pcm: Vec::new() };
        assert!(timeline.place(&empty).is_empty());
        assert_eq!(timeline.cursor(), 0);
    }

    #[test]
    fn cursor_is_monotonic_for_any_sequence() {
        let mut timeline = AudioTimeline::new(fmt());
        let starts = [0, 5, 3, 12, 1, 40, 40, 39, 100, 2, 101, 250, 0];
        let mut last = timeline.cursor();
        for (i, start) in starts.iter().enumerate() {
            let duration = TEN_MS * (1 + (i as i64 % 3));
            timeline.place(&chunk(start * TEN_MS / 2, duration));
            assert!(timeline.cursor() >= last);
            last = timeline.cursor();
        }
    }
}
