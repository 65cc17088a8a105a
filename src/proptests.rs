use super::*;

use proptest::prelude::*;
use std::collections::BTreeSet;

const REGION_SIZE: u64 = 0x2000;

#[derive(Clone, Copy, Debug)]
struct Block {
    start: u64,
    size: u32,
}

impl Block {
    fn end(&self) -> u64 {
        self.start + u64::from(self.size)
    }

    fn pcs(&self) -> std::ops::Range<u64> {
        self.start..self.end()
    }
}

fn base_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(0u64),
        (1u64..1 << 20).prop_map(|x| x << 2),
        (1u64..1 << 12).prop_map(|x| x << 32),
    ]
}

/// Non-overlapping, 4-aligned blocks, each starting at least one bucket after
/// the previous start. Offsets are relative to the region start.
fn layout_strategy() -> impl Strategy<Value = Vec<Block>> {
    prop::collection::vec((0u64..256, 0u32..1500), 0..=48).prop_map(|raw| {
        let mut blocks = Vec::new();
        let mut cursor = 0u64;
        for (gap, size) in raw {
            let start = cursor + gap * 4;
            let block = Block { start, size };
            if block.end() > REGION_SIZE {
                break;
            }
            blocks.push(block);
            cursor = (block.end().max(start + 32) + 3) & !3;
        }
        blocks
    })
}

fn build(encoding: Encoding, base: u64, blocks: &[Block]) -> AnyNibbleMap {
    let mut m = AnyNibbleMap::with_encoding(encoding, base, REGION_SIZE);
    for b in blocks {
        m.allocate(b.start, b.size).unwrap();
    }
    m
}

fn rebase(base: u64, blocks: &[Block]) -> Vec<Block> {
    blocks
        .iter()
        .map(|b| Block {
            start: base + b.start,
            size: b.size,
        })
        .collect()
}

fn validate_map(m: &AnyNibbleMap, live: &[Block]) {
    for b in live {
        for pc in b.pcs() {
            assert_eq!(
                m.find(pc),
                Some(b.start),
                "{} map lost pc {pc:#x} of block {:#x}+{}",
                m.encoding(),
                b.start,
                b.size
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_find_resolves_every_pc(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        layout in layout_strategy(),
    ) {
        let blocks = rebase(base, &layout);
        let m = build(encoding, base, &blocks);
        validate_map(&m, &blocks);

        let first = blocks.first().map_or(base + REGION_SIZE, |b| b.start);
        for pc in base..first {
            prop_assert_eq!(m.find(pc), None);
        }
    }

    #[test]
    fn prop_find_returns_nearest_start(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        layout in layout_strategy(),
        probes in prop::collection::vec(0u64..REGION_SIZE, 1..=256),
    ) {
        let blocks = rebase(base, &layout);
        let m = build(encoding, base, &blocks);
        let starts: BTreeSet<u64> = blocks.iter().map(|b| b.start).collect();

        for probe in probes {
            let pc = base + probe;
            let nearest = starts.range(..=pc).next_back().copied();
            match (encoding, m.find(pc)) {
                // Only the classic layout walks back through empty units.
                (Encoding::Classic, found) => prop_assert_eq!(found, nearest),
                (Encoding::Compressed, None) => {
                    let inside = blocks.iter().find(|b| b.pcs().contains(&pc));
                    prop_assert!(inside.is_none(), "pc {:#x} inside {:?} not found", pc, inside);
                }
                (Encoding::Compressed, found) => prop_assert_eq!(found, nearest),
            }
        }
    }

    #[test]
    fn prop_low_bits_ignored(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        layout in layout_strategy(),
        probes in prop::collection::vec(0u64..REGION_SIZE, 1..=256),
    ) {
        let blocks = rebase(base, &layout);
        let m = build(encoding, base, &blocks);
        for probe in probes {
            let pc = base + probe;
            prop_assert_eq!(m.find(pc), m.find(pc & !3));
        }
    }

    #[test]
    fn prop_delete_subset(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        layout in layout_strategy(),
        mask in prop::collection::vec(any::<bool>(), 48),
    ) {
        let blocks = rebase(base, &layout);
        let mut m = build(encoding, base, &blocks);

        let (dead, live): (Vec<_>, Vec<_>) = blocks
            .iter()
            .zip(&mask)
            .partition(|(_, &delete)| delete);
        let dead: Vec<Block> = dead.into_iter().map(|(b, _)| *b).collect();
        let live: Vec<Block> = live.into_iter().map(|(b, _)| *b).collect();

        for b in &dead {
            m.delete(b.start).unwrap();
        }
        validate_map(&m, &live);
        for b in &dead {
            for pc in b.pcs() {
                prop_assert_ne!(m.find(pc), Some(b.start));
            }
            prop_assert!(m.delete(b.start).unwrap_err().is_illegal_state());
        }

        for b in &live {
            m.delete(b.start).unwrap();
        }
        prop_assert!(m.store().as_bytes().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn prop_reallocate_restores_layout(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        layout in layout_strategy(),
        mask in prop::collection::vec(any::<bool>(), 48),
    ) {
        let blocks = rebase(base, &layout);
        let fresh = build(encoding, base, &blocks);
        let mut m = build(encoding, base, &blocks);

        let dead: Vec<Block> = blocks
            .iter()
            .zip(&mask)
            .filter(|(_, &delete)| delete)
            .map(|(b, _)| *b)
            .collect();
        for b in &dead {
            m.delete(b.start).unwrap();
        }
        for b in dead.iter().rev() {
            m.allocate(b.start, b.size).unwrap();
        }
        prop_assert_eq!(m.store(), fresh.store());
    }

    #[test]
    fn prop_failed_allocate_is_noop(
        encoding in any::<Encoding>(),
        layout in layout_strategy(),
        start in 0u64..REGION_SIZE + 64,
        size in 0u32..4096,
    ) {
        let mut m = build(encoding, 0, &layout);
        let before = m.store().clone();
        if m.allocate(start, size).is_err() {
            prop_assert_eq!(m.store(), &before);
        }
    }

    #[test]
    fn prop_single_block_covers_region(
        encoding in any::<Encoding>(),
        base in base_strategy(),
        offset in (0u64..64).prop_map(|x| x * 4),
    ) {
        let mut m = AnyNibbleMap::with_encoding(encoding, base, REGION_SIZE);
        let block = Block {
            start: base + offset,
            size: (REGION_SIZE - offset) as u32,
        };
        m.allocate(block.start, block.size).unwrap();
        validate_map(&m, &[block]);
        m.delete(block.start).unwrap();
        prop_assert!(m.store().as_bytes().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn prop_encodings_agree_inside_blocks(
        base in base_strategy(),
        layout in layout_strategy(),
    ) {
        let blocks = rebase(base, &layout);
        let classic = build(Encoding::Classic, base, &blocks);
        let compressed = build(Encoding::Compressed, base, &blocks);
        for b in &blocks {
            for pc in b.pcs().step_by(4) {
                prop_assert_eq!(classic.find(pc), compressed.find(pc));
            }
        }
    }

    #[test]
    fn prop_nibble_scan_matches_fallback(x in any::<u32>()) {
        prop_assert_eq!(bits::highest_set_nibble(x), bits::highest_set_nibble_fallback(x));
        prop_assert_eq!(bits::lowest_set_nibble(x), bits::lowest_set_nibble_fallback(x));
    }
}
