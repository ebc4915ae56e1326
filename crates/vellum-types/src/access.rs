//! Permission codec.
//!
//! A resource carries nine independent triad bits, owner / group / public ×
//! read / write / visible, plus an `INTERNAL` bit marking resources that must
//! not be delivered directly.
//!
//! ```text
//!            read  write  visible
//! owner        1      2        4
//! group        8     16       32
//! public      64    128      256
//! internal   512
//! ```
//!
//! Aggregate masks (`READ`, `OWNER`, `DEFAULT`, ...) are unions of the base
//! bits, declared once below. Everything here is pure and total.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::principal::Role;

bitflags! {
    /// Access mask of a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const OWNER_READ      = 1;
        const OWNER_WRITE     = 1 << 1;
        const OWNER_VISIBLE   = 1 << 2;
        const GROUP_READ      = 1 << 3;
        const GROUP_WRITE     = 1 << 4;
        const GROUP_VISIBLE   = 1 << 5;
        const PUBLIC_READ     = 1 << 6;
        const PUBLIC_WRITE    = 1 << 7;
        const PUBLIC_VISIBLE  = 1 << 8;
        /// Cannot be launched or delivered directly.
        const INTERNAL        = 1 << 9;

        /// Everyone may read.
        const READ    = Self::OWNER_READ.bits() | Self::GROUP_READ.bits() | Self::PUBLIC_READ.bits();
        /// Everyone may write.
        const WRITE   = Self::OWNER_WRITE.bits() | Self::GROUP_WRITE.bits() | Self::PUBLIC_WRITE.bits();
        /// Everyone may see.
        const VISIBLE = Self::OWNER_VISIBLE.bits() | Self::GROUP_VISIBLE.bits() | Self::PUBLIC_VISIBLE.bits();

        /// Full owner triad.
        const OWNER  = Self::OWNER_READ.bits() | Self::OWNER_WRITE.bits() | Self::OWNER_VISIBLE.bits();
        /// Full group triad.
        const GROUP  = Self::GROUP_READ.bits() | Self::GROUP_WRITE.bits() | Self::GROUP_VISIBLE.bits();
        /// Full public triad.
        const PUBLIC = Self::PUBLIC_READ.bits() | Self::PUBLIC_WRITE.bits() | Self::PUBLIC_VISIBLE.bits();

        /// Mask for new resources: owner and group get everything, the
        /// public may read and see but not write.
        const DEFAULT = Self::OWNER.bits() | Self::GROUP.bits()
            | Self::PUBLIC_READ.bits() | Self::PUBLIC_VISIBLE.bits();
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::DEFAULT
    }
}

/// One role's read / write / visible bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Triad {
    pub read: bool,
    pub write: bool,
    pub visible: bool,
}

impl Triad {
    pub const NONE: Triad = Triad { read: false, write: false, visible: false };
    pub const ALL: Triad = Triad { read: true, write: true, visible: true };
    /// Read + visible.
    pub const READ_ONLY: Triad = Triad { read: true, write: false, visible: true };

    pub fn new(read: bool, write: bool, visible: bool) -> Self {
        Self { read, write, visible }
    }

    /// Pack into the low three bits (read=1, write=2, visible=4).
    fn bits(self) -> u32 {
        (self.read as u32) | ((self.write as u32) << 1) | ((self.visible as u32) << 2)
    }

    fn from_bits(bits: u32) -> Self {
        Self {
            read: bits & 1 != 0,
            write: bits & 2 != 0,
            visible: bits & 4 != 0,
        }
    }
}

/// What a caller wants to do with a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Visible,
    /// Direct external delivery (launching the resource). Needs the read bit
    /// and a clear `INTERNAL` bit.
    Deliver,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Visible => "visible",
            Capability::Deliver => "deliver",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit offset of a role's triad inside the mask.
fn triad_shift(role: Role) -> u32 {
    match role {
        Role::Owner => 0,
        Role::GroupMember => 3,
        Role::Other => 6,
    }
}

/// Build a mask from three triads and the internal bit.
pub fn encode(owner: Triad, group: Triad, public: Triad, internal: bool) -> AccessFlags {
    let mut bits = owner.bits() | (group.bits() << 3) | (public.bits() << 6);
    if internal {
        bits |= AccessFlags::INTERNAL.bits();
    }
    AccessFlags::from_bits_truncate(bits)
}

/// Split a mask into `(owner, group, public, internal)`.
pub fn decode(flags: AccessFlags) -> (Triad, Triad, Triad, bool) {
    let bits = flags.bits();
    (
        Triad::from_bits(bits),
        Triad::from_bits(bits >> 3),
        Triad::from_bits(bits >> 6),
        flags.contains(AccessFlags::INTERNAL),
    )
}

/// The triad that applies to `role`.
pub fn triad_for(flags: AccessFlags, role: Role) -> Triad {
    Triad::from_bits(flags.bits() >> triad_shift(role))
}

/// Does `role` hold `capability` under `flags`?
///
/// Only the role's own triad is consulted: an owner whose owner-write bit is
/// clear cannot write even when the public write bit is set.
pub fn evaluate(flags: AccessFlags, capability: Capability, role: Role) -> bool {
    let triad = triad_for(flags, role);
    match capability {
        Capability::Read => triad.read,
        Capability::Write => triad.write,
        Capability::Visible => triad.visible,
        Capability::Deliver => triad.read && !flags.contains(AccessFlags::INTERNAL),
    }
}

impl AccessFlags {
    /// Accept a raw mask, dropping unknown bits.
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }

    /// Shorthand for [`evaluate`].
    pub fn allows(&self, capability: Capability, role: Role) -> bool {
        evaluate(*self, capability, role)
    }

    /// Render as `rwvrwvrwv` plus a trailing `i` when internal, `-` for clear bits.
    pub fn to_symbolic(&self) -> String {
        let (owner, group, public, internal) = decode(*self);
        let mut out = String::with_capacity(10);
        for t in [owner, group, public] {
            out.push(if t.read { 'r' } else { '-' });
            out.push(if t.write { 'w' } else { '-' });
            out.push(if t.visible { 'v' } else { '-' });
        }
        out.push(if internal { 'i' } else { '-' });
        out
    }
}

/// Error parsing the symbolic form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid access mask '{0}': expected 9 or 10 chars like rwvrwvr-v-")]
pub struct InvalidAccessMask(pub String);

impl FromStr for AccessFlags {
    type Err = InvalidAccessMask;

    /// Parses the form produced by [`AccessFlags::to_symbolic`]. The trailing
    /// internal position is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 9 && chars.len() != 10 {
            return Err(InvalidAccessMask(s.to_string()));
        }
        const EXPECTED: [char; 3] = ['r', 'w', 'v'];
        let mut bits = 0u32;
        for (i, c) in chars.iter().take(9).enumerate() {
            match *c {
                '-' => {}
                c if c == EXPECTED[i % 3] => bits |= 1 << i,
                _ => return Err(InvalidAccessMask(s.to_string())),
            }
        }
        match chars.get(9) {
            None | Some('-') => {}
            Some('i') => bits |= AccessFlags::INTERNAL.bits(),
            Some(_) => return Err(InvalidAccessMask(s.to_string())),
        }
        Ok(AccessFlags::from_bits_truncate(bits))
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_symbolic())
    }
}
