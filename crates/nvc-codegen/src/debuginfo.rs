//! Codec for the compact per-function debug byte stream: a sequence of
//! 4-bit-tag/4-bit-payload bytes that lets the runtime unwinder map an
//! anchor's `ir_position` back to a source location, without carrying a
//! standard debug format.
//!
//! The encoder runs once per function, right after the entry function is
//! declared (before its body is lowered, since the stream only depends on
//! the IR buffer and the block layout, not on generated code). The decoder
//! exists so this round trip is testable in isolation; the runtime's own
//! unwinder is out of scope for this crate.

use crate::ir::{CfgFunction, Instr, Opcode, Operand};

const TAG_TRAP: u8 = 0;
const TAG_LONG_TRAP: u8 = 1;
const TAG_TARGET: u8 = 2;
const TAG_FILE: u8 = 3;
const TAG_LOCINFO: u8 = 4;
const TAG_LONG_LOCINFO: u8 = 5;
const TAG_STOP: u8 = 6;

fn byte(tag: u8, payload: u8) -> u8 {
    debug_assert!(tag <= 0xF && payload <= 0xF);
    (tag << 4) | payload
}

/// One decoded event, positioned at an IR instruction index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Target { ir_index: usize },
    Location { ir_index: usize, file: Option<String>, line: u32 },
}

struct Encoder {
    out: Vec<u8>,
    trap_run: u32,
}

impl Encoder {
    fn flush_trap(&mut self) {
        if self.trap_run == 0 {
            return;
        }
        if self.trap_run <= 15 {
            self.out.push(byte(TAG_TRAP, self.trap_run as u8));
        } else {
            self.out.push(byte(TAG_LONG_TRAP, 0));
            self.out.extend_from_slice(&(self.trap_run as u16).to_le_bytes());
        }
        self.trap_run = 0;
    }
}

/// Encodes the debug stream for `func`: `TARGET` at every block entry that
/// is the destination of a non-fallthrough edge, `FILE`/`LOCINFO` at every
/// `DEBUG` instruction, terminated by `STOP`.
#[must_use]
pub fn encode(func: &CfgFunction) -> Vec<u8> {
    let targets: std::collections::BTreeSet<usize> = func
        .branch_targets()
        .into_iter()
        .map(|id| func.block(id).start)
        .collect();

    let mut enc = Encoder {
        out: Vec::new(),
        trap_run: 0,
    };
    let mut last_file: Option<String> = None;
    let mut last_line: u32 = 0;

    for (index, instr) in func.instrs.iter().enumerate() {
        if targets.contains(&index) {
            enc.flush_trap();
            enc.out.push(byte(TAG_TARGET, 0));
        }

        if instr.op != Opcode::Debug {
            enc.trap_run += 1;
            continue;
        }

        enc.flush_trap();
        let (file, line) = debug_loc(instr);

        if file != last_file {
            if let Some(name) = &file {
                let mut bytes = name.clone().into_bytes();
                bytes.push(0);
                let len_plus_one = name.len() as u64 + 1;
                let log2_floor = 63 - len_plus_one.leading_zeros();
                enc.out.push(byte(TAG_FILE, (log2_floor & 0xF) as u8));
                enc.out.extend_from_slice(&bytes);
            }
            last_file = file;
        }

        let delta = line as i64 - last_line as i64;
        if (0..=15).contains(&delta) {
            enc.out.push(byte(TAG_LOCINFO, delta as u8));
        } else {
            enc.out.push(byte(TAG_LONG_LOCINFO, 0));
            enc.out.extend_from_slice(&(line as u16).to_le_bytes());
        }
        last_line = line;
    }

    enc.flush_trap();
    enc.out.push(byte(TAG_STOP, 0));
    enc.out
}

fn debug_loc(instr: &Instr) -> (Option<String>, u32) {
    for arg in &instr.args {
        if let Operand::DebugLoc { file, line } = arg {
            return (file.clone(), *line);
        }
    }
    (None, 0)
}

/// Decodes a stream produced by [`encode`] back into its sequence of
/// events, walking the IR index counter in lockstep with the tags.
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<DebugEvent> {
    let mut events = Vec::new();
    let mut ir_index = 0usize;
    let mut pos = 0usize;
    let mut pending_file: Option<String> = None;

    while pos < bytes.len() {
        let b = bytes[pos];
        let tag = b >> 4;
        let payload = b & 0xF;
        pos += 1;

        match tag {
            t if t == TAG_TRAP => {
                ir_index += payload as usize;
            }
            t if t == TAG_LONG_TRAP => {
                let run = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
                pos += 2;
                ir_index += run as usize;
            }
            t if t == TAG_TARGET => {
                events.push(DebugEvent::Target { ir_index });
            }
            t if t == TAG_FILE => {
                let start = pos;
                while bytes[pos] != 0 {
                    pos += 1;
                }
                pending_file = Some(String::from_utf8_lossy(&bytes[start..pos]).into_owned());
                pos += 1;
            }
            t if t == TAG_LOCINFO => {
                events.push(DebugEvent::Location {
                    ir_index,
                    file: pending_file.clone(),
                    line: last_line(&events) + u32::from(payload),
                });
                ir_index += 1;
            }
            t if t == TAG_LONG_LOCINFO => {
                let line = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
                pos += 2;
                events.push(DebugEvent::Location {
                    ir_index,
                    file: pending_file.clone(),
                    line: u32::from(line),
                });
                ir_index += 1;
            }
            t if t == TAG_STOP => break,
            other => unreachable!("unknown debug stream tag {other}"),
        }
    }

    events
}

fn last_line(events: &[DebugEvent]) -> u32 {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            DebugEvent::Location { line, .. } => Some(*line),
            DebugEvent::Target { .. } => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cc, FunctionBuilder, Instr, Opcode, Width};

    #[test]
    fn no_debug_instructions_emits_only_trap_and_stop() {
        let mut b = FunctionBuilder::new("f");
        let r0 = b.alloc_reg();
        let blk = b.block();
        b.push(Instr::new(Opcode::Recv).with_result(r0).with_args(vec![Operand::ArgIndex(0)]));
        b.push(Instr::new(Opcode::Send).with_args(vec![Operand::ArgIndex(0), Operand::Reg(r0)]));
        b.push(Instr::new(Opcode::Ret));
        b.set_returns(blk, true);
        let func = b.finish();

        let stream = encode(&func);
        assert_eq!(stream, vec![byte(TAG_TRAP, 3), byte(TAG_STOP, 0)]);
        assert!(decode(&stream).is_empty());
    }

    #[test]
    fn debug_instruction_round_trips_file_and_line() {
        let mut b = FunctionBuilder::new("f");
        let blk = b.block();
        b.push(Instr::new(Opcode::Debug).with_args(vec![Operand::DebugLoc {
            file: Some("a.vhd".to_string()),
            line: 12,
        }]));
        b.push(Instr::new(Opcode::Ret).with_cc(Cc::None).with_width(Width::W64));
        b.set_returns(blk, true);
        let func = b.finish();

        let stream = encode(&func);
        let events = decode(&stream);
        assert_eq!(
            events,
            vec![DebugEvent::Location {
                ir_index: 0,
                file: Some("a.vhd".to_string()),
                line: 12,
            }]
        );
    }
}
