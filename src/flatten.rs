//! The control-flow flattener: walks a decode-time [`Instr`] tree and emits
//! a flat [`FlatInstr`] vector with every block/loop/if back-patched with
//! the program counters it jumps to on exit.
//!
//! Mirrors the block-stack bookkeeping a Wasm interpreter's "analyze" pass
//! uses internally (push a context on `block`/`loop`/`if`, pop and
//! back-patch once the matching boundary PC is known), just performed as a
//! standalone pass over an already-decoded tree rather than interleaved
//! with opcode decoding.

use crate::instr::{FlatInstr, Instr, InstrChildren, InstrKind};

/// Flatten a single instruction sequence (a function body, or a constant
/// expression such as a global initializer or element/data segment offset)
/// into its PC-indexed form.
pub(crate) fn flatten(body: &[Instr]) -> Vec<FlatInstr> {
    let mut out = Vec::new();
    flatten_into(body, &mut out);
    out
}

fn flatten_into(body: &[Instr], out: &mut Vec<FlatInstr>) {
    for instr in body {
        flatten_one(instr, out);
    }
}

fn flatten_one(instr: &Instr, out: &mut Vec<FlatInstr>) {
    match &instr.children {
        InstrChildren::None => {
            out.push(FlatInstr {
                kind: instr.kind.clone(),
                // Plain instructions don't branch; both fields point just
                // past themselves, matching every other instruction's
                // "PC of the next instruction" shape.
                continuation_pc: (out.len() + 1) as u32,
                else_continuation_pc: (out.len() + 1) as u32,
            });
        }
        InstrChildren::Block(children) => {
            let opener_pc = out.len();
            // Placeholder; back-patched once `children`'s matching `end`
            // has been emitted and its PC is known.
            out.push(FlatInstr {
                kind: instr.kind.clone(),
                continuation_pc: 0,
                else_continuation_pc: 0,
            });
            flatten_into(children, out);
            let past_end_pc = out.len() as u32;
            let continuation_pc = match instr.kind {
                // A loop branches back to its own opener; every other
                // block-shaped instruction exits past its `end`.
                InstrKind::Loop(_) => opener_pc as u32,
                _ => past_end_pc,
            };
            out[opener_pc].continuation_pc = continuation_pc;
            out[opener_pc].else_continuation_pc = continuation_pc;
        }
        InstrChildren::If {
            then_body,
            else_body,
        } => {
            let opener_pc = out.len();
            out.push(FlatInstr {
                kind: instr.kind.clone(),
                continuation_pc: 0,
                else_continuation_pc: 0,
            });
            flatten_into(then_body, out);

            let else_continuation_pc;
            if let Some(else_body) = else_body {
                // `then_body`'s last element is the `Else` instruction
                // itself; it was just flattened as a plain instruction
                // above, with continuation_pc pointing past itself, i.e.
                // at the first instruction of `else_body`.
                else_continuation_pc = out.len() as u32;
                flatten_into(else_body, out);
            } else {
                else_continuation_pc = out.len() as u32;
            }

            let past_end_pc = out.len() as u32;
            out[opener_pc].continuation_pc = past_end_pc;
            out[opener_pc].else_continuation_pc = else_continuation_pc;

            // The `else` instruction (if present) is an unconditional exit
            // from the then-arm: its own continuation_pc should point past
            // the outer `end`, not at the (already-passed) start of the
            // else-arm.
            if else_body.is_some() {
                if let Some(else_pos) = find_else_pc(opener_pc, past_end_pc, out) {
                    out[else_pos].continuation_pc = past_end_pc;
                }
            }
        }
    }
}

/// Locate the flattened `Else` instruction belonging to the `if` opener at
/// `opener_pc`, by scanning forward for the first top-level `Else` within
/// `[opener_pc, past_end_pc)`. The then-branch may itself contain nested
/// `if`/`block`/`loop` constructs, so nesting depth must be tracked.
fn find_else_pc(opener_pc: usize, past_end_pc: u32, out: &[FlatInstr]) -> Option<usize> {
    let mut depth = 0i32;
    for pc in (opener_pc + 1)..(past_end_pc as usize) {
        match &out[pc].kind {
            InstrKind::Block(_) | InstrKind::Loop(_) | InstrKind::If(_) => depth += 1,
            InstrKind::Else if depth == 0 => return Some(pc),
            InstrKind::End => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{BlockSignature, Opcode};

    fn leaf(kind: InstrKind) -> Instr {
        Instr::leaf(kind)
    }

    #[test]
    fn test_flatten_plain_sequence() {
        // local.get 0; end
        let body = vec![leaf(InstrKind::LocalGet(0)), leaf(InstrKind::End)];
        let flat = flatten(&body);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].kind, InstrKind::LocalGet(0));
        assert_eq!(flat[0].continuation_pc, 1);
        assert_eq!(flat[1].kind, InstrKind::End);
    }

    #[test]
    fn test_flatten_block_with_break() {
        // block i32; i32.const 7; br 0; i32.const 9; end; end
        let inner = vec![
            leaf(InstrKind::I32Const(7)),
            leaf(InstrKind::Br(0)),
            leaf(InstrKind::I32Const(9)),
            leaf(InstrKind::End),
        ];
        let block = Instr {
            kind: InstrKind::Block(BlockSignature::Value(crate::types::ValueType::I32)),
            children: InstrChildren::Block(inner),
        };
        let body = vec![block, leaf(InstrKind::End)];
        let flat = flatten(&body);
        // [0]=block opener [1]=i32.const7 [2]=br0 [3]=i32.const9 [4]=end(inner) [5]=end(outer)
        assert_eq!(flat.len(), 6);
        assert_eq!(flat[0].continuation_pc, 5);
        assert_eq!(flat[2].kind, InstrKind::Br(0));
        assert_eq!(flat[3].kind, InstrKind::I32Const(9));
    }

    #[test]
    fn test_flatten_loop_continuation_is_backward() {
        // loop; br 0; end; end
        let inner = vec![leaf(InstrKind::Br(0)), leaf(InstrKind::End)];
        let loop_instr = Instr {
            kind: InstrKind::Loop(BlockSignature::Empty),
            children: InstrChildren::Block(inner),
        };
        let body = vec![loop_instr, leaf(InstrKind::End)];
        let flat = flatten(&body);
        assert_eq!(flat[0].continuation_pc, 0);
    }

    #[test]
    fn test_flatten_if_else_wiring() {
        // i32.const 1; if i32; i32.const 2; else; i32.const 3; end; end
        let then_body = vec![leaf(InstrKind::I32Const(2)), leaf(InstrKind::Else)];
        let else_body = vec![leaf(InstrKind::I32Const(3)), leaf(InstrKind::End)];
        let if_instr = Instr {
            kind: InstrKind::If(BlockSignature::Value(crate::types::ValueType::I32)),
            children: InstrChildren::If {
                then_body,
                else_body: Some(else_body),
            },
        };
        let body = vec![leaf(InstrKind::I32Const(1)), if_instr, leaf(InstrKind::End)];
        let flat = flatten(&body);
        // [0]=i32.const1 [1]=if [2]=i32.const2 [3]=else [4]=i32.const3 [5]=end(inner) [6]=end(outer)
        assert_eq!(flat.len(), 7);
        let if_pc = 1;
        assert_eq!(flat[if_pc].continuation_pc, 6);
        assert_eq!(flat[if_pc].else_continuation_pc, 4);
        let else_pc = 3;
        assert_eq!(flat[else_pc].kind, InstrKind::Else);
        assert_eq!(flat[else_pc].continuation_pc, 6);
    }

    #[test]
    fn test_flatten_if_without_else() {
        // if empty; end; end  (no else arm)
        let then_body = vec![leaf(InstrKind::End)];
        let if_instr = Instr {
            kind: InstrKind::If(BlockSignature::Empty),
            children: InstrChildren::If {
                then_body,
                else_body: None,
            },
        };
        let body = vec![if_instr, leaf(InstrKind::End)];
        let flat = flatten(&body);
        // [0]=if [1]=end(inner) [2]=end(outer)
        assert_eq!(flat[0].continuation_pc, 2);
        assert_eq!(flat[0].else_continuation_pc, 2);
    }

    #[test]
    fn test_flattener_totality() {
        let inner = vec![leaf(InstrKind::Br(0)), leaf(InstrKind::End)];
        let loop_instr = Instr {
            kind: InstrKind::Loop(BlockSignature::Empty),
            children: InstrChildren::Block(inner),
        };
        let body = vec![loop_instr, leaf(InstrKind::End)];
        let flat = flatten(&body);
        for instr in &flat {
            assert!(instr.continuation_pc as usize <= flat.len());
            assert!(instr.else_continuation_pc as usize <= flat.len());
        }
        // Silence unused-import warning in case Opcode isn't otherwise referenced.
        let _ = Opcode::Nop;
    }
}
