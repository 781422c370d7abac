//! The opcode table: the ABI between the frontend and the backend (§6).
//!
//! Each [`Opcode`] has a fixed side-effect classification (§4.3's taxonomy)
//! and a return-type rule. Both are static, total matches over the
//! implemented opcode subset (§9: "the spec captures the implemented
//! subset... other enumerators exist for forward compatibility" — this
//! crate simply doesn't declare variants it doesn't classify, so the
//! exhaustiveness check does the "panic on unregistered opcode" job for us
//! at compile time rather than at run time).

use crate::types::Type;
use std::fmt;

/// One IR operation. Grouped the same way the teacher's `BinOp`/`UnOp`
/// enums are grouped: constants, memory, integer arith/bitwise, extension,
/// float arith, conversion, comparison, control, vector, select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ── Constants ────────────────────────────────────────────────────────
    Iconst,
    F32const,
    F64const,
    Vconst,

    // ── Memory ───────────────────────────────────────────────────────────
    Load,
    Store,

    // ── Integer arithmetic & bitwise ─────────────────────────────────────
    Iadd,
    Isub,
    Imul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    Band,
    Bor,
    Bxor,
    Ishl,
    Sshr,
    Ushr,
    Rotl,
    Rotr,
    Clz,
    Ctz,
    Popcnt,

    // ── Extension & reduction ────────────────────────────────────────────
    Sextend,
    Uextend,
    Ireduce,

    // ── Float arithmetic ─────────────────────────────────────────────────
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fneg,
    Fabs,
    Fcopysign,
    Sqrt,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Fmin,
    Fmax,

    // ── Conversion ───────────────────────────────────────────────────────
    FcvtFromSint,
    FcvtFromUint,
    FcvtToSint,
    FcvtToUint,
    FcvtToSintSat,
    FcvtToUintSat,
    Fpromote,
    Fdemote,
    Bitcast,

    // ── Comparison ───────────────────────────────────────────────────────
    Icmp,
    Fcmp,

    // ── Control ──────────────────────────────────────────────────────────
    Jump,
    Brz,
    Brnz,
    BrTable,
    Return,
    Call,
    CallIndirect,
    Exit,
    ExitIfTrue,

    // ── Vector ───────────────────────────────────────────────────────────
    Vband,
    Vbor,
    Vbxor,
    Vbandnot,
    Vbnot,
    Vbitselect,
    Viadd,
    Visub,
    Vimul,
    VimaxS,
    VimaxU,
    ViminS,
    ViminU,
    Vsaddsat,
    Vuaddsat,
    Vssubsat,
    Vusubsat,
    Viabs,
    Vineg,
    Vipopcnt,
    Vavground,
    VallTrue,
    VanyTrue,
    VhighBits,

    // ── Select ───────────────────────────────────────────────────────────
    Select,
}

/// Side-effect classification used by dead-code elimination (§4.3) to decide
/// what's removable and what bounds an instruction group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Must remain; must not be reordered across another Strict/Trap
    /// boundary; bumps the instruction-group id.
    Strict,
    /// Must remain live (can trap), but may be reordered within its group.
    Trap,
    /// Pure; eliminable if unused; freely reorderable within its group.
    None,
}

/// How an opcode's result type is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnRule {
    /// No result value (branches, stores, return, exit).
    NoReturn,
    /// Result type equals the type of the first operand (most arithmetic).
    SameAsFirstOperand,
    /// Result type is fixed, independent of operands.
    Fixed(Type),
    /// Result type(s) come from the callee signature (`call`/`call_indirect`).
    SignatureLookup,
}

impl Opcode {
    /// Side-effect kind for this opcode (§4.3's taxonomy). Exhaustive: a new
    /// opcode variant must be classified here before it can be added at all.
    pub fn side_effect(self) -> SideEffect {
        use Opcode::*;
        match self {
            // Strict: must stay, bounds a group, bumps group id.
            Store | Jump | Brz | Brnz | BrTable | Return | Call | CallIndirect | Exit
            | ExitIfTrue => SideEffect::Strict,

            // Trap: can fault on bad inputs, stays live, reorderable within group.
            Sdiv | Udiv | Srem | Urem | FcvtToSint | FcvtToUint => SideEffect::Trap,

            // None: pure, eliminable, reorderable within group.
            Iconst | F32const | F64const | Vconst | Load | Iadd | Isub | Imul | Band | Bor
            | Bxor | Ishl | Sshr | Ushr | Rotl | Rotr | Clz | Ctz | Popcnt | Sextend | Uextend
            | Ireduce | Fadd | Fsub | Fmul | Fdiv | Fneg | Fabs | Fcopysign | Sqrt | Ceil
            | Floor | Trunc | Nearest | Fmin | Fmax | FcvtFromSint | FcvtFromUint
            | FcvtToSintSat | FcvtToUintSat | Fpromote | Fdemote | Bitcast | Icmp | Fcmp
            | Vband | Vbor | Vbxor | Vbandnot | Vbnot | Vbitselect | Viadd | Visub | Vimul
            | VimaxS | VimaxU | ViminS | ViminU | Vsaddsat | Vuaddsat | Vssubsat | Vusubsat
            | Viabs | Vineg | Vipopcnt | Vavground | VallTrue | VanyTrue | VhighBits | Select => {
                SideEffect::None
            }
        }
    }

    /// Return-type rule for this opcode (§6).
    pub fn return_rule(self) -> ReturnRule {
        use Opcode::*;
        match self {
            Store | Jump | Brz | Brnz | BrTable | Return | Exit => ReturnRule::NoReturn,
            Call | CallIndirect => ReturnRule::SignatureLookup,
            Icmp | Fcmp | ExitIfTrue | VallTrue | VanyTrue => ReturnRule::Fixed(Type::I32),
            Vconst | Vband | Vbor | Vbxor | Vbandnot | Vbnot | Vbitselect | Viadd | Visub
            | Vimul | VimaxS | VimaxU | ViminS | ViminU | Vsaddsat | Vuaddsat | Vssubsat
            | Vusubsat | Viabs | Vineg | Vipopcnt | Vavground | VhighBits => {
                ReturnRule::Fixed(Type::V128)
            }
            // Operand-typed arithmetic, loads, bit-casts: same type as the
            // value being operated on or loaded.
            Iconst | F32const | F64const | Load | Iadd | Isub | Imul | Sdiv | Udiv | Srem
            | Urem | Band | Bor | Bxor | Ishl | Sshr | Ushr | Rotl | Rotr | Clz | Ctz | Popcnt
            | Fadd | Fsub | Fmul | Fdiv | Fneg | Fabs | Fcopysign | Sqrt | Ceil | Floor | Trunc
            | Nearest | Fmin | Fmax | Select => ReturnRule::SameAsFirstOperand,
            // Conversions and extensions carry their destination type
            // explicitly on the instruction (the `ty` slot, §3), since it
            // can't be derived from the operand alone.
            Sextend | Uextend | Ireduce | FcvtFromSint | FcvtFromUint | FcvtToSint | FcvtToUint
            | FcvtToSintSat | FcvtToUintSat | Fpromote | Fdemote | Bitcast => {
                ReturnRule::SameAsFirstOperand
            }
        }
    }

    /// Textual description, used by the debug formatter (§6).
    pub fn description(self) -> &'static str {
        use Opcode::*;
        match self {
            Iconst => "integer constant",
            F32const => "f32 constant",
            F64const => "f64 constant",
            Vconst => "v128 constant",
            Load => "memory load, optionally narrow and sign/zero extended",
            Store => "memory store, optionally narrowed",
            Iadd => "integer add",
            Isub => "integer subtract",
            Imul => "integer multiply",
            Sdiv => "signed integer divide (traps on /0 or overflow)",
            Udiv => "unsigned integer divide (traps on /0)",
            Srem => "signed integer remainder (traps on /0)",
            Urem => "unsigned integer remainder (traps on /0)",
            Band => "bitwise and",
            Bor => "bitwise or",
            Bxor => "bitwise xor",
            Ishl => "shift left",
            Sshr => "arithmetic shift right",
            Ushr => "logical shift right",
            Rotl => "rotate left",
            Rotr => "rotate right",
            Clz => "count leading zeros",
            Ctz => "count trailing zeros",
            Popcnt => "population count",
            Sextend => "sign extend",
            Uextend => "zero extend",
            Ireduce => "integer narrowing reduction",
            Fadd => "float add",
            Fsub => "float subtract",
            Fmul => "float multiply",
            Fdiv => "float divide",
            Fneg => "float negate",
            Fabs => "float absolute value",
            Fcopysign => "float copysign",
            Sqrt => "float square root",
            Ceil => "float ceiling",
            Floor => "float floor",
            Trunc => "float truncate towards zero",
            Nearest => "float round to nearest, ties to even",
            Fmin => "float minimum",
            Fmax => "float maximum",
            FcvtFromSint => "convert signed integer to float",
            FcvtFromUint => "convert unsigned integer to float",
            FcvtToSint => "convert float to signed integer (traps on NaN/overflow)",
            FcvtToUint => "convert float to unsigned integer (traps on NaN/overflow)",
            FcvtToSintSat => "convert float to signed integer, saturating",
            FcvtToUintSat => "convert float to unsigned integer, saturating",
            Fpromote => "promote f32 to f64",
            Fdemote => "demote f64 to f32",
            Bitcast => "reinterpret bits as another type of the same width",
            Icmp => "integer compare",
            Fcmp => "float compare",
            Jump => "unconditional branch",
            Brz => "branch if zero",
            Brnz => "branch if nonzero",
            BrTable => "multi-way branch",
            Return => "return from function",
            Call => "direct call",
            CallIndirect => "indirect call through a table",
            Exit => "exit with code",
            ExitIfTrue => "exit with code if condition is true",
            Vband => "vector bitwise and",
            Vbor => "vector bitwise or",
            Vbxor => "vector bitwise xor",
            Vbandnot => "vector bitwise and-not",
            Vbnot => "vector bitwise not",
            Vbitselect => "vector bitwise select",
            Viadd => "vector integer add",
            Visub => "vector integer subtract",
            Vimul => "vector integer multiply",
            VimaxS => "vector signed integer max",
            VimaxU => "vector unsigned integer max",
            ViminS => "vector signed integer min",
            ViminU => "vector unsigned integer min",
            Vsaddsat => "vector signed add, saturating",
            Vuaddsat => "vector unsigned add, saturating",
            Vssubsat => "vector signed subtract, saturating",
            Vusubsat => "vector unsigned subtract, saturating",
            Viabs => "vector integer absolute value",
            Vineg => "vector integer negate",
            Vipopcnt => "vector population count",
            Vavground => "vector rounding average",
            VallTrue => "vector all-lanes-true reduction",
            VanyTrue => "vector any-lane-true reduction",
            VhighBits => "vector high-bits-of-each-lane extraction",
            Select => "select between two values by condition",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_opcodes_bound_groups() {
        assert_eq!(Opcode::Store.side_effect(), SideEffect::Strict);
        assert_eq!(Opcode::Call.side_effect(), SideEffect::Strict);
        assert_eq!(Opcode::Jump.side_effect(), SideEffect::Strict);
        assert_eq!(Opcode::Return.side_effect(), SideEffect::Strict);
    }

    #[test]
    fn trap_opcodes_stay_live_but_reorderable() {
        assert_eq!(Opcode::Sdiv.side_effect(), SideEffect::Trap);
        assert_eq!(Opcode::Udiv.side_effect(), SideEffect::Trap);
        assert_eq!(Opcode::Srem.side_effect(), SideEffect::Trap);
        assert_eq!(Opcode::Urem.side_effect(), SideEffect::Trap);
        assert_eq!(Opcode::FcvtToSint.side_effect(), SideEffect::Trap);
        assert_eq!(Opcode::FcvtToUint.side_effect(), SideEffect::Trap);
    }

    #[test]
    fn pure_opcodes_are_eliminable() {
        assert_eq!(Opcode::Iadd.side_effect(), SideEffect::None);
        assert_eq!(Opcode::Iconst.side_effect(), SideEffect::None);
        assert_eq!(Opcode::Load.side_effect(), SideEffect::None);
    }

    #[test]
    fn comparisons_return_i32() {
        assert_eq!(Opcode::Icmp.return_rule(), ReturnRule::Fixed(Type::I32));
        assert_eq!(Opcode::Fcmp.return_rule(), ReturnRule::Fixed(Type::I32));
    }

    #[test]
    fn calls_use_signature_lookup() {
        assert_eq!(Opcode::Call.return_rule(), ReturnRule::SignatureLookup);
        assert_eq!(Opcode::CallIndirect.return_rule(), ReturnRule::SignatureLookup);
    }

    #[test]
    fn branches_have_no_return() {
        assert_eq!(Opcode::Jump.return_rule(), ReturnRule::NoReturn);
        assert_eq!(Opcode::Brz.return_rule(), ReturnRule::NoReturn);
        assert_eq!(Opcode::BrTable.return_rule(), ReturnRule::NoReturn);
    }

    #[test]
    fn every_opcode_has_a_description() {
        // Spot-check a handful across families rather than all ~90, since
        // the match in `description` is exhaustive and will fail to compile
        // if a variant is missing.
        assert!(!Opcode::Iadd.description().is_empty());
        assert!(!Opcode::Vipopcnt.description().is_empty());
        assert!(!Opcode::Select.description().is_empty());
    }
}
