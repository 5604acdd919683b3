use std::io::Write;
use std::path::Path;

use skool::{Addr, Base, BlockKind, SkoolResult, Snapshot, ADDR_LIMIT};

use crate::codemap::read_code_blocks;
use crate::components::{Config, DisInstruction, Disassembler};
use crate::ctl::{get_blocks, CtlMap, CtlParser};
use crate::disassembly::Disassembly;
use crate::z80::{operand_address, ZxDisassembler};

/// Partition `[start, end)` of the snapshot into code, text, data and
/// zero blocks.
///
/// With a code map the executed addresses seed the code blocks and a
/// seven-phase fixed-point refinement classifies the rest; without one a
/// heuristic pass seeds block boundaries at RET/JP/JR bytes and the
/// blocks are analysed for text and data shape.  Either way the returned
/// map covers every address in `[start, end)` exactly once and ends with
/// a terminal ignore sentinel at `end`.
///
/// # Errors
///
/// Returns a code-map error for an unreadable or unrecognised code map.
pub fn generate_ctls(
    snapshot: &Snapshot,
    start: Addr,
    end: Addr,
    code_map: Option<&Path>,
) -> SkoolResult<CtlMap> {
    let mut ctls = match code_map {
        Some(path) => {
            generate_ctls_with_code_map(snapshot, start, end, path)?
        }
        None => generate_ctls_without_code_map(snapshot, start, end)?,
    };

    // Join any adjacent data and zero blocks
    let blocks = get_blocks(&ctls);
    if let Some(mut prev) = blocks.first().copied() {
        for block in &blocks[1..] {
            let joinable = |kind: BlockKind| {
                matches!(kind, BlockKind::Data | BlockKind::Zero)
            };
            if joinable(prev.0) && joinable(block.0) {
                ctls.insert(prev.1, BlockKind::Data);
                ctls.remove(&block.1);
            } else {
                prev = *block;
            }
        }
    }

    Ok(ctls)
}

/// Serialise a ctl map: `@ start`/`@ org` lines for the lowest address,
/// then one `KIND ADDR` line per block below 65536, with addresses in
/// the chosen base.
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_ctl<W: Write>(
    writer: &mut W,
    ctls: &CtlMap,
    base: Base,
) -> std::io::Result<()> {
    let Some(first) = ctls.keys().next() else {
        return Ok(());
    };
    let start = base.addr_str(*first);
    writeln!(writer, "@ {start} start")?;
    writeln!(writer, "@ {start} org")?;
    for (address, kind) in ctls {
        if *address < ADDR_LIMIT {
            writeln!(
                writer,
                "{} {}",
                kind.to_char(),
                base.addr_str(*address)
            )?;
        }
    }
    Ok(())
}

/// True for instructions that unconditionally end control flow: RET,
/// JP nn, JP (HL)/(IX)/(IY), RETN/RETI, and JR with a non-zero
/// displacement.
fn is_terminal_instruction(instruction: &DisInstruction) -> bool {
    let data = &instruction.bytes;
    let Some(first) = data.first() else {
        return false;
    };
    if matches!(first, 195 | 201 | 233) {
        // JP nn / RET / JP (HL)
        return true;
    }
    if data.len() == 2 {
        if *first == 237
            && matches!(data[1], 69 | 77 | 85 | 93 | 101 | 109 | 117 | 125)
        {
            // RETN/RETI
            return true;
        }
        if matches!(first, 221 | 253) && data[1] == 233 {
            // JP (IX)/JP (IY)
            return true;
        }
        if *first == 24 && data[1] != 0 {
            // JR d (d != 0)
            return true;
        }
    }
    false
}

/// Decode the single instruction starting at `address`.
fn instruction_at(snapshot: &Snapshot, address: Addr) -> DisInstruction {
    let mut decoded = ZxDisassembler.disassemble(
        snapshot,
        address,
        address + 1,
        Base::Decimal,
    );
    decoded.swap_remove(0)
}

/// Walk forward from `start` to the end of the next terminal
/// instruction, bounded by `end`.
///
/// With `ctl` set, a boundary carrying that kind is inserted after the
/// terminal instruction (when free and below 65536).  Without it, block
/// boundaries covered en route are deleted (the walk is extending a
/// code block across unknown blocks) and the walk also stops on
/// reaching an existing code block; the last deleted boundary's kind is
/// used for the new boundary instead.
fn find_terminal_instruction(
    snapshot: &Snapshot,
    ctls: &mut CtlMap,
    start: Addr,
    end: Addr,
    ctl: Option<BlockKind>,
) -> Addr {
    let mut address = start;
    let mut next_ctl = None;
    while address < end {
        let instruction = instruction_at(snapshot, address);
        address = instruction.address + instruction.size() as Addr;
        if ctl.is_none() {
            for a in instruction.address..address {
                if let Some(kind) = ctls.remove(&a) {
                    next_ctl = Some(kind);
                }
            }
            if ctls.get(&address) == Some(&BlockKind::Code) {
                break;
            }
        }
        if is_terminal_instruction(&instruction) {
            if address < ADDR_LIMIT && !ctls.contains_key(&address) {
                ctls.insert(
                    address,
                    ctl.or(next_ctl).unwrap_or(BlockKind::Unknown),
                );
            }
            break;
        }
    }
    address
}

/// The seven-phase classifier driven by an execution trace.
fn generate_ctls_with_code_map(
    snapshot: &Snapshot,
    start: Addr,
    end: Addr,
    code_map: &Path,
) -> SkoolResult<CtlMap> {
    // (1) Mark all executed blocks as code and unexecuted gaps as
    // unknown
    let mut ctls = CtlMap::new();
    ctls.insert(start, BlockKind::Unknown);
    ctls.insert(end, BlockKind::Ignore);
    for (address, length) in
        read_code_blocks(snapshot, start, end, code_map)?
    {
        ctls.insert(address, BlockKind::Code);
        if address + length < end {
            ctls.insert(address + length, BlockKind::Unknown);
        }
    }

    // (2) Where a code block doesn't end on a terminal instruction,
    // extend it up to the next terminal in the following unknown blocks,
    // or up to the next code block
    let codec = ZxDisassembler;
    loop {
        let mut done = true;
        for (kind, b_start, b_end) in get_blocks(&ctls) {
            if kind != BlockKind::Code {
                continue;
            }
            let block_instructions =
                codec.disassemble(snapshot, b_start, b_end, Base::Decimal);
            if block_instructions
                .last()
                .map_or(false, is_terminal_instruction)
            {
                continue;
            }
            if find_terminal_instruction(
                snapshot, &mut ctls, b_end, end, None,
            ) < end
            {
                done = false;
                break;
            }
        }
        if done {
            break;
        }
    }

    // (3) Promote unknown-block instructions that code blocks call or
    // jump to, extending each promotion to its terminal.  The first
    // qualifying instruction in address order wins; the entry is then
    // evicted and the scan restarts.
    let config = Config::default();
    let mut disassembly = Disassembly::new(
        snapshot,
        &CtlParser::from_ctls(&ctls),
        &config,
        Base::Decimal,
        false,
    )?;
    loop {
        disassembly.build(&CtlParser::from_ctls(&ctls), true);
        let mut promotion = None;
        'scan: for entry in &disassembly.entries {
            if entry.ctl != BlockKind::Unknown {
                continue;
            }
            for instruction in entry.instructions() {
                for referrer in &instruction.referrers {
                    if ctls.get(referrer) == Some(&BlockKind::Code) {
                        promotion = Some((
                            instruction.address,
                            entry.address,
                            entry.next_address.unwrap_or(ADDR_LIMIT),
                            entry.ctl,
                        ));
                        break 'scan;
                    }
                }
            }
        }
        let Some((address, entry_address, entry_end, entry_ctl)) =
            promotion
        else {
            break;
        };
        ctls.insert(address, BlockKind::Code);
        find_terminal_instruction(
            snapshot,
            &mut ctls,
            address,
            entry_end,
            Some(entry_ctl),
        );
        disassembly.remove_entry(entry_address);
    }

    // (4) Split code blocks after interior terminal instructions
    for (kind, b_address, b_end) in get_blocks(&ctls) {
        if kind != BlockKind::Code {
            continue;
        }
        let mut next_address = find_terminal_instruction(
            snapshot,
            &mut ctls,
            b_address,
            b_end,
            Some(BlockKind::Code),
        );
        if next_address < b_end {
            disassembly.remove_entry(b_address);
            while next_address < b_end {
                next_address = find_terminal_instruction(
                    snapshot,
                    &mut ctls,
                    next_address,
                    b_end,
                    Some(BlockKind::Code),
                );
            }
        }
    }

    // (5) Join adjacent blocks where the first branches to the second's
    // start
    join_branch_pairs(&mut ctls, &mut disassembly, &|entry| {
        entry.ctl == BlockKind::Code
    });

    // (6) Examine the remaining unknown blocks for text
    for (kind, b_start, b_end) in get_blocks(&ctls) {
        if kind != BlockKind::Unknown {
            continue;
        }
        ctls.insert(b_start, BlockKind::Data);
        for (t_start, t_end) in get_text_blocks(snapshot, b_start, b_end)
        {
            ctls.insert(t_start, BlockKind::Text);
            if t_end < b_end {
                ctls.insert(t_end, BlockKind::Data);
            }
        }
    }

    // (7) Mark data blocks of all zeroes
    for (kind, b_start, b_end) in get_blocks(&ctls) {
        if kind == BlockKind::Data && snapshot.sum(b_start, b_end) == 0 {
            ctls.insert(b_start, BlockKind::Zero);
        }
    }

    Ok(ctls)
}

/// The heuristic classifier used when no execution trace is available.
fn generate_ctls_without_code_map(
    snapshot: &Snapshot,
    start: Addr,
    end: Addr,
) -> SkoolResult<CtlMap> {
    let mut ctls = CtlMap::new();
    ctls.insert(start, BlockKind::Code);
    ctls.insert(end, BlockKind::Ignore);

    // Assume potential RET, JP nn and JR d instructions end a block; the
    // final byte needs no examination because no block can follow it
    for address in start..end.saturating_sub(1) {
        match snapshot.byte(address) {
            201 => {
                ctls.insert(address + 1, BlockKind::Code);
            }
            195 if i64::from(address) < i64::from(end) - 3 => {
                ctls.insert(address + 3, BlockKind::Code);
            }
            24 if i64::from(address) < i64::from(end) - 2 => {
                ctls.insert(address + 2, BlockKind::Code);
            }
            _ => {}
        }
    }

    let config = Config::default();
    let mut disassembly = Disassembly::new(
        snapshot,
        &CtlParser::from_ctls(&ctls),
        &config,
        Base::Decimal,
        false,
    )?;

    // Join pairs of adjacent blocks that overlap (a mid-block branch
    // straddles the boundary)
    loop {
        let mut done = true;
        let merges: Vec<(Addr, Addr)> = disassembly
            .entries
            .iter()
            .take(disassembly.entries.len().saturating_sub(1))
            .filter(|entry| !entry.bad_blocks.is_empty())
            .filter_map(|entry| {
                entry.next_address.map(|next| (entry.address, next))
            })
            .collect();
        for (address, next) in merges {
            ctls.remove(&next);
            disassembly.remove_entry(address);
            disassembly.remove_entry(next);
            done = false;
        }
        if done {
            break;
        }
        disassembly.build(&CtlParser::from_ctls(&ctls), false);
    }

    // Join blocks that don't end on RET, JP nn or JR d into their
    // successor
    let mut changed = false;
    let merges: Vec<(Addr, Addr)> = disassembly
        .entries
        .iter()
        .take(disassembly.entries.len().saturating_sub(1))
        .filter(|entry| {
            entry
                .instructions()
                .last()
                .map_or(true, |last| !ends_a_block(&last.operation))
        })
        .filter_map(|entry| {
            entry
                .next_address
                .filter(|next| *next < end)
                .map(|next| (entry.address, next))
        })
        .collect();
    for (address, next) in merges {
        ctls.remove(&next);
        disassembly.remove_entry(address);
        disassembly.remove_entry(next);
        changed = true;
    }
    if changed {
        disassembly.build(&CtlParser::from_ctls(&ctls), false);
    }

    // Join adjacent blocks where the first branches to the second's
    // start
    join_branch_pairs(&mut ctls, &mut disassembly, &|_| true);

    // Mark a NOP sequence at the beginning of each block as a separate
    // zero block
    for entry in &disassembly.entries {
        ctls.insert(entry.address, BlockKind::Zero);
        for instruction in entry.instructions() {
            if instruction.operation != "NOP" {
                ctls.insert(instruction.address, BlockKind::Code);
                break;
            }
        }
    }

    analyse_blocks(snapshot, &mut ctls, &mut disassembly);
    Ok(ctls)
}

/// True for the operations the heuristic classifier accepts as a block
/// ending: `RET`, or an unconditional `JP`/`JR` to a literal decimal
/// address.
fn ends_a_block(operation: &str) -> bool {
    if operation == "RET" {
        return true;
    }
    let target = match operation.get(..3) {
        Some("JP ") | Some("JR ") => &operation[3..],
        _ => return false,
    };
    !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit())
}

/// Repeatedly fuse adjacent block pairs where an instruction of the
/// first (filtered by `eligible`) jumps to the second's start address.
fn join_branch_pairs(
    ctls: &mut CtlMap,
    disassembly: &mut Disassembly<'_>,
    eligible: &dyn Fn(&crate::disassembly::Entry) -> bool,
) {
    loop {
        disassembly.build(&CtlParser::from_ctls(ctls), false);
        let mut fusions: Vec<(Addr, Addr)> = Vec::new();
        for entry in disassembly
            .entries
            .iter()
            .take(disassembly.entries.len().saturating_sub(1))
        {
            if !eligible(entry) {
                continue;
            }
            let Some(next_address) = entry.next_address else {
                continue;
            };
            let branches_to_next = entry.instructions().any(|i| {
                let operation = i.operation.to_ascii_uppercase();
                (operation.starts_with("JR")
                    || operation.starts_with("JP"))
                    && operand_address(&operation) == Some(next_address)
            });
            if branches_to_next {
                fusions.push((entry.address, next_address));
            }
        }
        if fusions.is_empty() {
            break;
        }
        for (address, next) in fusions {
            ctls.remove(&next);
            disassembly.remove_entry(address);
            disassembly.remove_entry(next);
        }
    }
}

/// Decide which heuristically-coded blocks actually look like text or
/// data, then demote code blocks without a terminal instruction.
fn analyse_blocks(
    snapshot: &Snapshot,
    ctls: &mut CtlMap,
    disassembly: &mut Disassembly<'_>,
) {
    // Text discovery loops until a pass finds none; blocks that look
    // like neither text nor data are deferred so they are not examined
    // again
    loop {
        let mut done = true;
        for (kind, b_start, b_end) in get_blocks(ctls) {
            if kind != BlockKind::Code {
                continue;
            }
            let text_blocks = get_text_blocks(snapshot, b_start, b_end);
            if !text_blocks.is_empty() {
                for (t_start, t_end) in text_blocks {
                    ctls.insert(t_start, BlockKind::Text);
                    if t_end < b_end {
                        ctls.insert(t_end, BlockKind::Code);
                    }
                }
                disassembly.remove_entry(b_start);
                done = false;
            } else if check_for_data(snapshot, b_start, b_end) {
                ctls.insert(b_start, BlockKind::Data);
                disassembly.remove_entry(b_start);
            } else {
                ctls.insert(b_start, BlockKind::Deferred);
            }
        }
        if done {
            break;
        }
    }

    // Relabel the deferred blocks as code
    let deferred: Vec<Addr> = ctls
        .iter()
        .filter(|(_, kind)| **kind == BlockKind::Deferred)
        .map(|(address, _)| *address)
        .collect();
    for address in deferred {
        ctls.insert(address, BlockKind::Code);
    }

    // Mark overlapping blocks and code blocks without a terminal
    // instruction as data
    disassembly.build(&CtlParser::from_ctls(ctls), false);
    let demotions: Vec<Addr> = disassembly
        .entries
        .iter()
        .filter(|entry| {
            !entry.bad_blocks.is_empty()
                || (ctls.get(&entry.address) == Some(&BlockKind::Code)
                    && !entry
                        .instructions()
                        .last()
                        .map_or(false, is_terminal_instruction))
        })
        .map(|entry| entry.address)
        .collect();
    for address in demotions {
        ctls.insert(address, BlockKind::Data);
    }

    // Mark a NOP sequence at the beginning of a code block as a zero
    // block
    for (kind, b_start, b_end) in get_blocks(ctls) {
        if kind != BlockKind::Code {
            continue;
        }
        ctls.insert(b_start, BlockKind::Zero);
        for address in b_start..b_end {
            if snapshot.byte(address) != 0 {
                ctls.insert(address, BlockKind::Code);
                break;
            }
        }
    }
}

/// The maximum number of distinct bytes in a data block, as a fraction
/// of the block length (3/10), and the run/ratio tests around it.
fn check_for_data(snapshot: &Snapshot, start: Addr, end: Addr) -> bool {
    let size = end - start;
    if size > 3 {
        // Any byte repeated more than three times in a row reads as data
        let mut count = 1;
        let mut prev = snapshot.byte(start);
        for address in start + 1..end {
            let b = snapshot.byte(address);
            if b == prev {
                count += 1;
                if count > 3 {
                    return true;
                }
            } else {
                count = 1;
                prev = b;
            }
        }
    }
    if size > 9 {
        let mut seen = [false; 256];
        for b in snapshot.slice(start, end) {
            seen[usize::from(*b)] = true;
        }
        let distinct = seen.iter().filter(|s| **s).count() as Addr;
        // distinct < 0.3 * size, in integer arithmetic
        return 10 * distinct < 3 * size;
    }
    false
}

/// The characters allowed in a text run.
fn is_text_char(b: u8) -> bool {
    b == b' '
        || b == b','
        || b == b'.'
        || b.is_ascii_alphanumeric()
}

/// Find the text runs in `[start, end)`.
///
/// A candidate is a maximal run over the text alphabet; it is accepted
/// when it is at least 3 bytes long, at least a quarter of it is
/// distinct non-punctuation characters, and at most a fifth of it is
/// punctuation.  An accepted run starting within 8 bytes of the previous
/// one extends it instead.
fn get_text_blocks(
    snapshot: &Snapshot,
    start: Addr,
    end: Addr,
) -> Vec<(Addr, Addr)> {
    let mut t_blocks: Vec<(Addr, Addr)> = Vec::new();
    if end - start < 3 {
        return t_blocks;
    }
    let mut letters: Vec<u8> = Vec::new();
    let mut punc = 0_u32;
    let mut t_start: Option<Addr> = None;
    for address in start..=end {
        let b = if address < end { snapshot.byte(address) } else { 0 };
        if address < end && is_text_char(b) {
            if b == b',' || b == b'.' {
                punc += 1;
            } else {
                letters.push(b);
            }
            t_start.get_or_insert(address);
        } else {
            if let Some(run_start) = t_start {
                check_text(
                    &mut t_blocks,
                    run_start,
                    address,
                    &letters,
                    punc,
                );
            }
            letters.clear();
            punc = 0;
            t_start = None;
        }
    }
    t_blocks
}

/// Accept or reject one candidate text run, merging it into the
/// previous accepted run when the gap between them is 8 bytes or less.
fn check_text(
    t_blocks: &mut Vec<(Addr, Addr)>,
    t_start: Addr,
    t_end: Addr,
    letters: &[u8],
    punc: u32,
) {
    let length = t_end - t_start;
    let mut seen = [false; 256];
    for b in letters {
        seen[usize::from(*b)] = true;
    }
    let distinct = seen.iter().filter(|s| **s).count() as Addr;
    // length >= 3, distinct >= length / 4, punctuation <= length / 5
    if length < 3 || 4 * distinct < length || 5 * punc > length {
        return;
    }
    if let Some(prev) = t_blocks.last_mut() {
        if prev.1 + 8 >= t_start {
            prev.1 = t_end;
            return;
        }
    }
    t_blocks.push((t_start, t_end));
}

#[cfg(test)]
mod tests {
    use coverage_helper::test;

    use super::*;

    #[test]
    fn nop_seed_classifies_as_one_zero_block() {
        let snapshot = Snapshot::new();
        let ctls = generate_ctls(&snapshot, 0, 65536, None).unwrap();
        let expected: Vec<(Addr, BlockKind)> =
            vec![(0, BlockKind::Zero), (65536, BlockKind::Ignore)];
        assert_eq!(
            ctls.into_iter().collect::<Vec<_>>(),
            expected,
            "an all-zero snapshot is a single zero block"
        );
    }

    #[test]
    fn single_ret_is_a_code_block() {
        let snapshot = Snapshot::from_data(&[0xC9], 32768);
        let ctls =
            generate_ctls(&snapshot, 32768, 32769, None).unwrap();
        assert_eq!(
            ctls.into_iter().collect::<Vec<_>>(),
            vec![
                (32768, BlockKind::Code),
                (32769, BlockKind::Ignore),
            ]
        );
    }

    #[test]
    fn jr_self_loop_is_terminal() {
        let snapshot = Snapshot::from_data(&[0x18, 0xFE], 40000);
        let ctls =
            generate_ctls(&snapshot, 40000, 40002, None).unwrap();
        assert_eq!(
            ctls.into_iter().collect::<Vec<_>>(),
            vec![
                (40000, BlockKind::Code),
                (40002, BlockKind::Ignore),
            ]
        );
    }

    #[test]
    fn nearby_text_runs_merge() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(50000, b"HELLO");
        snapshot.poke(50005, &[1, 2, 3, 4, 5]);
        snapshot.poke(50010, b"WORLD");
        let ctls =
            generate_ctls(&snapshot, 50000, 50015, None).unwrap();
        assert_eq!(
            ctls.into_iter().collect::<Vec<_>>(),
            vec![
                (50000, BlockKind::Text),
                (50015, BlockKind::Ignore),
            ],
            "a 5-byte gap between accepted runs merges them"
        );
    }

    #[test]
    fn text_predicate_rejects_low_diversity_runs() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(50000, b"aaaaaaaaaaaa");
        assert!(
            get_text_blocks(&snapshot, 50000, 50012).is_empty(),
            "a run of one distinct character is not text"
        );
        snapshot.poke(50000, b"Hello, world.");
        assert_eq!(
            get_text_blocks(&snapshot, 50000, 50013),
            vec![(50000, 50013)]
        );
    }

    #[test]
    fn data_check_spots_repeats_and_low_variety() {
        let mut snapshot = Snapshot::new();
        snapshot.poke(30000, &[9, 9, 9, 9, 9, 1]);
        assert!(
            check_for_data(&snapshot, 30000, 30006),
            "a byte repeated more than 3 times in a row is data"
        );
        snapshot.poke(30010, &[1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2]);
        assert!(
            check_for_data(&snapshot, 30010, 30022),
            "2 distinct bytes in 12 is data"
        );
        snapshot.poke(30030, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!check_for_data(&snapshot, 30030, 30038));
    }

    #[test]
    fn terminal_instruction_set() {
        let terminal = |bytes: &[u8]| {
            is_terminal_instruction(&DisInstruction::new(
                0,
                bytes.to_vec(),
                String::new(),
            ))
        };
        assert!(terminal(&[0xC9]), "RET");
        assert!(terminal(&[0xC3, 0, 0x80]), "JP nn");
        assert!(terminal(&[0xE9]), "JP (HL)");
        assert!(terminal(&[0xED, 0x45]), "RETN");
        assert!(terminal(&[0xED, 0x4D]), "RETI");
        assert!(terminal(&[0xDD, 0xE9]), "JP (IX)");
        assert!(terminal(&[0xFD, 0xE9]), "JP (IY)");
        assert!(terminal(&[0x18, 0xFE]), "JR with non-zero d");
        assert!(!terminal(&[0x18, 0x00]), "JR 0 is not terminal");
        assert!(!terminal(&[0x00]), "NOP is not terminal");
        assert!(!terminal(&[0xC8]), "RET Z is conditional");
    }

    #[test]
    fn classification_covers_every_address_exactly_once() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
        let mut data = vec![0_u8; 4096];
        rng.fill(data.as_mut_slice());
        let snapshot = Snapshot::from_data(&data, 32768);
        let ctls =
            generate_ctls(&snapshot, 32768, 36864, None).unwrap();

        let keys: Vec<Addr> = ctls.keys().copied().collect();
        assert_eq!(keys[0], 32768, "the least key is the start");
        assert_eq!(
            *keys.last().unwrap(),
            36864,
            "the largest key is the terminal sentinel"
        );
        assert_eq!(ctls[&36864], BlockKind::Ignore);
        for (kind, b_start, b_end) in get_blocks(&ctls) {
            assert!(b_start < b_end, "blocks are non-empty");
            assert!(
                kind.is_entry_kind(),
                "no working kind survives classification: {kind:?}"
            );
        }
    }

    #[test]
    fn classification_is_deterministic() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut data = vec![0_u8; 2048];
        rng.fill(data.as_mut_slice());
        let snapshot = Snapshot::from_data(&data, 40000);
        let first = generate_ctls(&snapshot, 40000, 42048, None).unwrap();
        let second =
            generate_ctls(&snapshot, 40000, 42048, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ctl_files_render_start_org_and_blocks() {
        let mut ctls = CtlMap::new();
        ctls.insert(30000, BlockKind::Code);
        ctls.insert(30010, BlockKind::Data);
        ctls.insert(65536, BlockKind::Ignore);
        let mut out = Vec::new();
        write_ctl(&mut out, &ctls, Base::Decimal).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "@ 30000 start\n@ 30000 org\nc 30000\nb 30010\n",
            "the sentinel at 65536 is not written"
        );
    }

    #[test]
    fn ctl_files_honour_the_hex_base() {
        let mut ctls = CtlMap::new();
        ctls.insert(0x8000, BlockKind::Code);
        ctls.insert(0x8010, BlockKind::Ignore);
        let mut out = Vec::new();
        write_ctl(&mut out, &ctls, Base::Hex).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "@ $8000 start\n@ $8000 org\nc $8000\ni $8010\n"
        );
    }
}
