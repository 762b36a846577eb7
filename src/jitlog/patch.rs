use std::ops::Range;

/// Machine code overwritten after a trace was assembled, e.g. when a guard is
/// redirected to a newly compiled bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePatch {
    /// The forest time at which the patch was decoded.
    pub time: u64,
    pub addr: u64,
    pub bytes: Vec<u8>,
}

impl CodePatch {
    pub fn end(&self) -> u64 {
        self.addr.saturating_add(self.bytes.len() as u64)
    }
}

/// Apply all patches up to time `time` to a snippet of machine code located at
/// `snippet_addr`.
///
/// Only patches which start inside `region` are considered, in the order in
/// which they were recorded. A patch which extends past either end of the
/// snippet is clipped.
pub fn apply_patches(
    snippet: &[u8],
    snippet_addr: u64,
    region: Range<u64>,
    patches: &[CodePatch],
    time: u64,
) -> Vec<u8> {
    let mut out = snippet.to_vec();
    for patch in patches
        .iter()
        .filter(|patch| patch.time <= time && region.contains(&patch.addr))
    {
        overlay(&mut out, snippet_addr, patch.addr, &patch.bytes);
    }
    out
}

fn overlay(out: &mut [u8], out_addr: u64, patch_addr: u64, bytes: &[u8]) {
    // A patch may start before the snippet.
    let (skip, dst_start) = if patch_addr >= out_addr {
        (0, patch_addr - out_addr)
    } else {
        (out_addr - patch_addr, 0)
    };
    let (Ok(skip), Ok(dst_start)) = (usize::try_from(skip), usize::try_from(dst_start)) else {
        return;
    };
    if skip >= bytes.len() || dst_start >= out.len() {
        return;
    }
    let src = &bytes[skip..];
    let len = src.len().min(out.len() - dst_start);
    out[dst_start..dst_start + len].copy_from_slice(&src[..len]);
}

#[cfg(test)]
mod test {
    use super::{apply_patches, CodePatch};

    fn patch(time: u64, addr: u64, bytes: &[u8]) -> CodePatch {
        CodePatch {
            time,
            addr,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn overlays_in_time_order() {
        let snippet = [0u8; 8];
        let patches = [patch(1, 0x1002, &[1, 1]), patch(5, 0x1003, &[2, 2, 2])];
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x1000..0x2000, &patches, 0),
            vec![0; 8]
        );
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x1000..0x2000, &patches, 1),
            vec![0, 0, 1, 1, 0, 0, 0, 0]
        );
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x1000..0x2000, &patches, 9),
            vec![0, 0, 1, 2, 2, 2, 0, 0]
        );
    }

    #[test]
    fn clips_at_both_ends() {
        let snippet = [0u8; 4];
        // Starts before the snippet, inside the region.
        let before = [patch(0, 0x0ffe, &[7, 7, 7, 7])];
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x0f00..0x2000, &before, 0),
            vec![7, 7, 0, 0]
        );
        let after = [patch(0, 0x1003, &[9, 9, 9])];
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x0f00..0x2000, &after, 0),
            vec![0, 0, 0, 9]
        );
        let outside = [patch(0, 0x3000, &[9])];
        assert_eq!(
            apply_patches(&snippet, 0x1000, 0x0f00..0x2000, &outside, 0),
            vec![0; 4]
        );
    }

    #[test]
    fn idempotent() {
        let snippet = [0x90u8; 6];
        let patches = [patch(0, 0x10, &[0xe9, 1, 2, 3, 4])];
        let once = apply_patches(&snippet, 0x10, 0x10..0x20, &patches, 3);
        let twice = apply_patches(&once, 0x10, 0x10..0x20, &patches, 3);
        assert_eq!(once, twice);
    }
}
