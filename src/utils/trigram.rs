use crate::index::types::{bytes_to_trigram, Trigram};

/// Bitset for tracking which trigrams have been seen.
/// Uses 2MB to cover all 16M possible trigram values (24 bits).
struct TrigramBitset {
    bits: Vec<u64>,
}

impl TrigramBitset {
    #[inline]
    fn new() -> Self {
        // 16M trigrams / 64 bits per u64 = 262144 u64s = 2MB
        Self {
            bits: vec![0u64; 262144],
        }
    }

    /// Check if trigram is set and set it. Returns true if it was already set.
    #[inline]
    fn test_and_set(&mut self, trigram: Trigram) -> bool {
        let idx = (trigram >> 6) as usize;
        let bit = 1u64 << (trigram & 63);
        let was_set = (self.bits[idx] & bit) != 0;
        self.bits[idx] |= bit;
        was_set
    }

    /// Collect all set trigrams in ascending order
    fn collect(&self) -> Vec<Trigram> {
        let mut result = Vec::with_capacity(8192);
        for (word_idx, &word) in self.bits.iter().enumerate() {
            if word == 0 {
                continue;
            }
            let base = (word_idx as u32) << 6;
            let mut w = word;
            while w != 0 {
                let bit_pos = w.trailing_zeros();
                result.push(base | bit_pos);
                w &= w - 1;
            }
        }
        result
    }
}

/// Extract the distinct overlapping trigrams of `content`, sorted ascending.
///
/// Content shorter than 3 bytes has no trigrams. Identical bytes always give
/// an identical vector, which keeps re-indexing deterministic.
pub fn extract_trigrams(content: &[u8]) -> Vec<Trigram> {
    if content.len() < 3 {
        return Vec::new();
    }

    // For small files, use simple sort+dedup (more cache-friendly than bitset)
    if content.len() < 1024 {
        let mut trigrams: Vec<Trigram> = content
            .windows(3)
            .map(|w| bytes_to_trigram(w[0], w[1], w[2]))
            .collect();
        trigrams.sort_unstable();
        trigrams.dedup();
        return trigrams;
    }

    let mut bitset = TrigramBitset::new();
    for window in content.windows(3) {
        bitset.test_and_set(bytes_to_trigram(window[0], window[1], window[2]));
    }
    bitset.collect()
}

/// Extract trigrams from a literal query (sorted, deduplicated)
pub fn query_trigrams(literal: &[u8]) -> Vec<Trigram> {
    if literal.len() < 3 {
        return Vec::new();
    }

    let mut trigrams: Vec<Trigram> = literal
        .windows(3)
        .map(|w| bytes_to_trigram(w[0], w[1], w[2]))
        .collect();
    trigrams.sort_unstable();
    trigrams.dedup();
    trigrams
}

/// Check if content is likely binary
pub fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(8192);
    if sample_size == 0 {
        return false;
    }
    let sample = &content[..sample_size];

    if memchr::memchr(0, sample).is_some() {
        return true;
    }

    // High proportion of control bytes
    let non_text_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0c)
        .count();

    non_text_count > sample_size / 8
}

/// Build the line-start table for `content`.
///
/// `\n`, `\r\n` and a lone `\r` each end a line. Offsets refer to the raw
/// bytes; the content itself is never rewritten.
pub fn build_line_offsets(content: &[u8]) -> Vec<u32> {
    let mut offsets = vec![0u32];
    let len = content.len();
    let mut i = 0;
    while i < len {
        match content[i] {
            b'\n' => {
                if i + 1 < len {
                    offsets.push((i + 1) as u32);
                }
            }
            b'\r' => {
                if i + 1 < len && content[i + 1] == b'\n' {
                    i += 1;
                }
                if i + 1 < len {
                    offsets.push((i + 1) as u32);
                }
            }
            _ => {}
        }
        i += 1;
    }
    offsets
}

/// 1-based line number of the byte at `offset`
pub fn line_for_offset(line_offsets: &[u32], offset: usize) -> u32 {
    let offset = offset.min(u32::MAX as usize) as u32;
    line_offsets.partition_point(|&start| start <= offset).max(1) as u32
}
