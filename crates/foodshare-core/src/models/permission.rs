//! Capability bitmask model.
//!
//! A [`PermissionSet`] is a `u64` bit-vector where every bit is one named
//! [`Capability`]. Bit positions are part of the persisted format: a new capability
//! always takes the next free bit and an existing bit is never reassigned.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

bitflags! {
    /// Set of capabilities granted by a group, or the union of several groups.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PermissionSet: u64 {
        const ADMIN = 1 << 0;

        const CREATE_USER = 1 << 1;
        const READ_USER = 1 << 2;
        const EDIT_USER = 1 << 3;

        const CREATE_ACT = 1 << 4;
        const READ_ACT = 1 << 5;
        const EDIT_ACT = 1 << 6;

        const ADD_CITY = 1 << 7;
        const READ_CITY = 1 << 8;
        const EDIT_CITY = 1 << 9;

        const ADD_COMPANY = 1 << 10;
        const READ_COMPANY = 1 << 11;
        const EDIT_COMPANY = 1 << 12;

        const CREATE_GROUP = 1 << 13;
        const READ_GROUP = 1 << 14;
        const EDIT_GROUP = 1 << 15;
    }
}

/// A single named capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Admin,
    CreateUser,
    ReadUser,
    EditUser,
    CreateAct,
    ReadAct,
    EditAct,
    AddCity,
    ReadCity,
    EditCity,
    AddCompany,
    ReadCompany,
    EditCompany,
    CreateGroup,
    ReadGroup,
    EditGroup,
}

impl Capability {
    /// Every capability in bit order.
    pub const ALL: [Capability; 16] = [
        Capability::Admin,
        Capability::CreateUser,
        Capability::ReadUser,
        Capability::EditUser,
        Capability::CreateAct,
        Capability::ReadAct,
        Capability::EditAct,
        Capability::AddCity,
        Capability::ReadCity,
        Capability::EditCity,
        Capability::AddCompany,
        Capability::ReadCompany,
        Capability::EditCompany,
        Capability::CreateGroup,
        Capability::ReadGroup,
        Capability::EditGroup,
    ];

    /// The single-bit set for this capability.
    pub const fn flag(self) -> PermissionSet {
        match self {
            Capability::Admin => PermissionSet::ADMIN,
            Capability::CreateUser => PermissionSet::CREATE_USER,
            Capability::ReadUser => PermissionSet::READ_USER,
            Capability::EditUser => PermissionSet::EDIT_USER,
            Capability::CreateAct => PermissionSet::CREATE_ACT,
            Capability::ReadAct => PermissionSet::READ_ACT,
            Capability::EditAct => PermissionSet::EDIT_ACT,
            Capability::AddCity => PermissionSet::ADD_CITY,
            Capability::ReadCity => PermissionSet::READ_CITY,
            Capability::EditCity => PermissionSet::EDIT_CITY,
            Capability::AddCompany => PermissionSet::ADD_COMPANY,
            Capability::ReadCompany => PermissionSet::READ_COMPANY,
            Capability::EditCompany => PermissionSet::EDIT_COMPANY,
            Capability::CreateGroup => PermissionSet::CREATE_GROUP,
            Capability::ReadGroup => PermissionSet::READ_GROUP,
            Capability::EditGroup => PermissionSet::EDIT_GROUP,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Admin => "admin",
            Capability::CreateUser => "create_user",
            Capability::ReadUser => "read_user",
            Capability::EditUser => "edit_user",
            Capability::CreateAct => "create_act",
            Capability::ReadAct => "read_act",
            Capability::EditAct => "edit_act",
            Capability::AddCity => "add_city",
            Capability::ReadCity => "read_city",
            Capability::EditCity => "edit_city",
            Capability::AddCompany => "add_company",
            Capability::ReadCompany => "read_company",
            Capability::EditCompany => "edit_company",
            Capability::CreateGroup => "create_group",
            Capability::ReadGroup => "read_group",
            Capability::EditGroup => "edit_group",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid capability: {}", s))
    }
}

impl PermissionSet {
    /// Returns true iff the set carries `Admin` or the capability's own bit.
    pub fn has(self, capability: Capability) -> bool {
        self.contains(PermissionSet::ADMIN) || self.contains(capability.flag())
    }

    pub fn is_admin(self) -> bool {
        self.contains(PermissionSet::ADMIN)
    }

    /// Bitwise OR of every set yielded by `sets`. Empty input gives the empty set.
    pub fn union_all<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = PermissionSet>,
    {
        sets.into_iter()
            .fold(PermissionSet::empty(), |acc, set| acc | set)
    }

    /// Named capabilities whose bits are set, in bit order.
    pub fn capabilities(self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.contains(c.flag()))
            .collect()
    }

    /// Column value for the `BIGINT permissions` column. Same bit pattern, signed.
    pub fn to_db(self) -> i64 {
        self.bits() as i64
    }

    /// Inverse of [`PermissionSet::to_db`]. Unknown bits are retained so a row written
    /// by a newer deployment round-trips unchanged.
    pub fn from_db(value: i64) -> Self {
        PermissionSet::from_bits_retain(value as u64)
    }
}

impl From<Capability> for PermissionSet {
    fn from(capability: Capability) -> Self {
        capability.flag()
    }
}

impl FromIterator<Capability> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PermissionSet::empty(), |acc, c| acc | c.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_disjoint_and_in_order() {
        let mut seen = PermissionSet::empty();
        for (i, cap) in Capability::ALL.iter().enumerate() {
            let flag = cap.flag();
            assert_eq!(flag.bits(), 1u64 << i, "{} moved", cap);
            assert!(!seen.intersects(flag));
            seen |= flag;
        }
        assert_eq!(seen, PermissionSet::all());
    }

    #[test]
    fn has_checks_specific_bit() {
        let set: PermissionSet = [Capability::ReadAct, Capability::ReadCompany]
            .into_iter()
            .collect();
        assert!(set.has(Capability::ReadAct));
        assert!(set.has(Capability::ReadCompany));
        assert!(!set.has(Capability::EditCompany));
        assert!(!set.has(Capability::Admin));
    }

    #[test]
    fn admin_short_circuits_every_check() {
        let set = PermissionSet::ADMIN;
        for cap in Capability::ALL {
            assert!(set.has(cap), "admin should imply {}", cap);
        }
    }

    #[test]
    fn empty_set_has_nothing() {
        let set = PermissionSet::empty();
        assert!(Capability::ALL.iter().all(|c| !set.has(*c)));
    }

    #[test]
    fn union_is_order_independent() {
        let volunteers = PermissionSet::READ_ACT | PermissionSet::READ_COMPANY;
        let auditors = PermissionSet::READ_COMPANY | PermissionSet::EDIT_COMPANY;

        let a = PermissionSet::union_all([volunteers, auditors]);
        let b = PermissionSet::union_all([auditors, volunteers]);
        assert_eq!(a, b);
        assert!(a.has(Capability::EditCompany));
        assert!(!a.has(Capability::CreateAct));
        assert_eq!(PermissionSet::union_all([]), PermissionSet::empty());
    }

    #[test]
    fn db_value_keeps_bit_pattern() {
        let set = PermissionSet::EDIT_GROUP | PermissionSet::ADMIN;
        assert_eq!(set.to_db(), (1 << 15) | 1);
        assert_eq!(PermissionSet::from_db(set.to_db()), set);

        let future_bit = 1i64 << 40;
        assert_eq!(PermissionSet::from_db(future_bit).to_db(), future_bit);
    }

    #[test]
    fn capability_names_parse() {
        for cap in Capability::ALL {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
        assert!("fly".parse::<Capability>().is_err());
    }

    #[test]
    fn capabilities_lists_set_bits() {
        let set = PermissionSet::READ_ACT | PermissionSet::CREATE_USER;
        assert_eq!(
            set.capabilities(),
            vec![Capability::CreateUser, Capability::ReadAct]
        );
    }
}
