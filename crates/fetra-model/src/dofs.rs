//! Degree-of-freedom vocabulary.
//!
//! A [`DOF`] is one of the six nodal unknowns; a [`DOFS`] is a bitmask set of
//! them with the usual set arithmetic and a bijection with the deck's packed
//! integer encoding (`"123456"` selects all six).

use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// One nodal degree of freedom, with a fixed position 0..5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DOF {
    DX,
    DY,
    DZ,
    RX,
    RY,
    RZ,
}

impl DOF {
    pub const ALL: [DOF; 6] = [DOF::DX, DOF::DY, DOF::DZ, DOF::RX, DOF::RY, DOF::RZ];

    pub fn position(self) -> usize {
        match self {
            DOF::DX => 0,
            DOF::DY => 1,
            DOF::DZ => 2,
            DOF::RX => 3,
            DOF::RY => 4,
            DOF::RZ => 5,
        }
    }

    pub fn code(self) -> u8 {
        1 << self.position()
    }

    pub fn find_by_position(position: usize) -> Option<DOF> {
        DOF::ALL.get(position).copied()
    }

    pub fn is_rotation(self) -> bool {
        matches!(self, DOF::RX | DOF::RY | DOF::RZ)
    }

    pub fn label(self) -> &'static str {
        match self {
            DOF::DX => "DX",
            DOF::DY => "DY",
            DOF::DZ => "DZ",
            DOF::RX => "RX",
            DOF::RY => "RY",
            DOF::RZ => "RZ",
        }
    }
}

impl Display for DOF {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A set of DOFs as a 6-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DOFS(u8);

impl DOFS {
    pub const NONE: DOFS = DOFS(0);
    pub const TRANSLATIONS: DOFS = DOFS(0b000111);
    pub const ROTATIONS: DOFS = DOFS(0b111000);
    pub const ALL_DOFS: DOFS = DOFS(0b111111);

    pub fn contains(self, dof: DOF) -> bool {
        self.0 & dof.code() != 0
    }

    pub fn contains_any_of(self, other: DOFS) -> bool {
        self.0 & other.0 != 0
    }

    pub fn intersection(self, other: DOFS) -> DOFS {
        DOFS(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = DOF> {
        DOF::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    /// Decode the deck's packed digit form: each decimal digit 1..6 selects a DOF.
    pub fn from_nastran_code(code: i32) -> DOFS {
        let mut dofs = DOFS::NONE;
        let mut remaining = code.abs();
        while remaining > 0 {
            let digit = (remaining % 10) as usize;
            if (1..=6).contains(&digit) {
                dofs = dofs + DOF::ALL[digit - 1];
            }
            remaining /= 10;
        }
        dofs
    }

    /// Encode to the packed digit form, digits ascending (`123456` for all).
    pub fn nastran_code(self) -> i32 {
        let mut code = 0;
        for dof in self.iter() {
            code = code * 10 + (dof.position() as i32 + 1);
        }
        code
    }
}

impl Add<DOF> for DOFS {
    type Output = DOFS;

    fn add(self, dof: DOF) -> DOFS {
        DOFS(self.0 | dof.code())
    }
}

impl Sub<DOF> for DOFS {
    type Output = DOFS;

    fn sub(self, dof: DOF) -> DOFS {
        DOFS(self.0 & !dof.code())
    }
}

impl Add<DOFS> for DOFS {
    type Output = DOFS;

    fn add(self, other: DOFS) -> DOFS {
        DOFS(self.0 | other.0)
    }
}

impl Sub<DOFS> for DOFS {
    type Output = DOFS;

    fn sub(self, other: DOFS) -> DOFS {
        DOFS(self.0 & !other.0)
    }
}

impl From<DOF> for DOFS {
    fn from(dof: DOF) -> DOFS {
        DOFS(dof.code())
    }
}

impl Display for DOFS {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for dof in self.iter() {
            write!(f, "{}", dof.position() + 1)?;
        }
        Ok(())
    }
}

/// A real coefficient per DOF, used by multi-point constraints and springs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DOFCoefs([f64; 6]);

impl DOFCoefs {
    pub fn new(coefs: [f64; 6]) -> Self {
        DOFCoefs(coefs)
    }

    pub fn get(&self, dof: DOF) -> f64 {
        self.0[dof.position()]
    }

    pub fn set(&mut self, dof: DOF, value: f64) {
        self.0[dof.position()] = value;
    }

    /// DOFs whose coefficient is non-zero.
    pub fn dofs(&self) -> DOFS {
        let mut dofs = DOFS::NONE;
        for dof in DOF::ALL {
            if self.0[dof.position()] != 0.0 {
                dofs = dofs + dof;
            }
        }
        dofs
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| *c == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_arithmetic_laws() {
        let s = DOFS::TRANSLATIONS;
        let d = DOF::RZ;
        assert_eq!((s + d) - d, s - d);
        assert_eq!(DOFS::TRANSLATIONS + DOFS::ROTATIONS, DOFS::ALL_DOFS);
        assert_eq!(DOFS::ALL_DOFS - DOFS::ROTATIONS, DOFS::TRANSLATIONS);
    }

    #[test]
    fn nastran_code_bijection() {
        assert_eq!(DOFS::from_nastran_code(123456), DOFS::ALL_DOFS);
        assert_eq!(DOFS::from_nastran_code(123), DOFS::TRANSLATIONS);
        assert_eq!(DOFS::ALL_DOFS.nastran_code(), 123456);
        for code in [1, 23, 136, 456, 123456] {
            let dofs = DOFS::from_nastran_code(code);
            assert_eq!(DOFS::from_nastran_code(dofs.nastran_code()), dofs);
        }
    }

    #[test]
    fn zero_code_is_empty() {
        assert_eq!(DOFS::from_nastran_code(0), DOFS::NONE);
        assert_eq!(DOFS::NONE.nastran_code(), 0);
    }

    #[test]
    fn contains_any_of_detects_overlap() {
        let s = DOFS::from(DOF::DX) + DOF::RY;
        assert!(s.contains_any_of(DOFS::TRANSLATIONS));
        assert!(s.contains_any_of(DOFS::ROTATIONS));
        assert!(!(s - DOF::RY).contains_any_of(DOFS::ROTATIONS));
    }

    #[test]
    fn coefs_track_nonzero_dofs() {
        let mut coefs = DOFCoefs::default();
        assert!(coefs.is_zero());
        coefs.set(DOF::DZ, -2.5);
        assert_eq!(coefs.get(DOF::DZ), -2.5);
        assert_eq!(coefs.dofs(), DOFS::from(DOF::DZ));
    }
}
