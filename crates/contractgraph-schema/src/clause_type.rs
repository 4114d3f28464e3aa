//! The closed clause taxonomy.
//!
//! Thirty categories of contractual provision, fixed for the life of the
//! process. The display names are the canonical wire strings exchanged with
//! the extraction collaborator; parsing is strict so that free-text variants
//! are rejected at the boundary instead of leaking into the graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of clause categories tracked per agreement.
pub const CLAUSE_TYPE_COUNT: usize = 30;

/// One of the 30 fixed categories of contractual provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClauseType {
    CompetitiveRestrictionException,
    NonCompete,
    Exclusivity,
    NoSolicitOfCustomers,
    NoSolicitOfEmployees,
    NonDisparagement,
    TerminationForConvenience,
    RofrRofoRofn,
    ChangeOfControl,
    AntiAssignment,
    RevenueProfitSharing,
    PriceRestrictions,
    MinimumCommitment,
    VolumeRestriction,
    IpOwnershipAssignment,
    JointIpOwnership,
    LicenseGrant,
    NonTransferableLicense,
    UnlimitedLicense,
    IrrevocableOrPerpetualLicense,
    SourceCodeEscrow,
    PostTerminationServices,
    AuditRights,
    UncappedLiability,
    CapOnLiability,
    LiquidatedDamages,
    WarrantyDuration,
    Insurance,
    CovenantNotToSue,
    ThirdPartyBeneficiary,
}

impl ClauseType {
    /// All clause types, in canonical order.
    pub const ALL: [ClauseType; CLAUSE_TYPE_COUNT] = [
        ClauseType::CompetitiveRestrictionException,
        ClauseType::NonCompete,
        ClauseType::Exclusivity,
        ClauseType::NoSolicitOfCustomers,
        ClauseType::NoSolicitOfEmployees,
        ClauseType::NonDisparagement,
        ClauseType::TerminationForConvenience,
        ClauseType::RofrRofoRofn,
        ClauseType::ChangeOfControl,
        ClauseType::AntiAssignment,
        ClauseType::RevenueProfitSharing,
        ClauseType::PriceRestrictions,
        ClauseType::MinimumCommitment,
        ClauseType::VolumeRestriction,
        ClauseType::IpOwnershipAssignment,
        ClauseType::JointIpOwnership,
        ClauseType::LicenseGrant,
        ClauseType::NonTransferableLicense,
        ClauseType::UnlimitedLicense,
        ClauseType::IrrevocableOrPerpetualLicense,
        ClauseType::SourceCodeEscrow,
        ClauseType::PostTerminationServices,
        ClauseType::AuditRights,
        ClauseType::UncappedLiability,
        ClauseType::CapOnLiability,
        ClauseType::LiquidatedDamages,
        ClauseType::WarrantyDuration,
        ClauseType::Insurance,
        ClauseType::CovenantNotToSue,
        ClauseType::ThirdPartyBeneficiary,
    ];

    /// Canonical display name (the wire string).
    pub fn name(&self) -> &'static str {
        match self {
            ClauseType::CompetitiveRestrictionException => "Competitive Restriction Exception",
            ClauseType::NonCompete => "Non-Compete",
            ClauseType::Exclusivity => "Exclusivity",
            ClauseType::NoSolicitOfCustomers => "No-Solicit Of Customers",
            ClauseType::NoSolicitOfEmployees => "No-Solicit Of Employees",
            ClauseType::NonDisparagement => "Non-Disparagement",
            ClauseType::TerminationForConvenience => "Termination For Convenience",
            ClauseType::RofrRofoRofn => "Rofr/Rofo/Rofn",
            ClauseType::ChangeOfControl => "Change Of Control",
            ClauseType::AntiAssignment => "Anti-Assignment",
            ClauseType::RevenueProfitSharing => "Revenue/Profit Sharing",
            ClauseType::PriceRestrictions => "Price Restrictions",
            ClauseType::MinimumCommitment => "Minimum Commitment",
            ClauseType::VolumeRestriction => "Volume Restriction",
            ClauseType::IpOwnershipAssignment => "IP Ownership Assignment",
            ClauseType::JointIpOwnership => "Joint IP Ownership",
            ClauseType::LicenseGrant => "License Grant",
            ClauseType::NonTransferableLicense => "Non-Transferable License",
            ClauseType::UnlimitedLicense => "Unlimited/All-You-Can-Eat License",
            ClauseType::IrrevocableOrPerpetualLicense => "Irrevocable Or Perpetual License",
            ClauseType::SourceCodeEscrow => "Source Code Escrow",
            ClauseType::PostTerminationServices => "Post-Termination Services",
            ClauseType::AuditRights => "Audit Rights",
            ClauseType::UncappedLiability => "Uncapped Liability",
            ClauseType::CapOnLiability => "Cap On Liability",
            ClauseType::LiquidatedDamages => "Liquidated Damages",
            ClauseType::WarrantyDuration => "Warranty Duration",
            ClauseType::Insurance => "Insurance",
            ClauseType::CovenantNotToSue => "Covenant Not To Sue",
            ClauseType::ThirdPartyBeneficiary => "Third Party Beneficiary",
        }
    }

    /// Case-insensitive lookup on the canonical name.
    ///
    /// Used where the caller is a human or an LLM ("change of control");
    /// the strict [`FromStr`] is the ingestion-boundary parser.
    pub fn parse_ci(s: &str) -> Option<ClauseType> {
        let folded = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|ct| ct.name().to_lowercase() == folded)
    }
}

impl fmt::Display for ClauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raised when a string names no member of the closed clause-type set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown clause type: {0:?}")]
pub struct UnknownClauseType(pub String);

impl FromStr for ClauseType {
    type Err = UnknownClauseType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ct| ct.name() == s)
            .ok_or_else(|| UnknownClauseType(s.to_string()))
    }
}

impl TryFrom<String> for ClauseType {
    type Error = UnknownClauseType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ClauseType> for String {
    fn from(ct: ClauseType) -> String {
        ct.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn taxonomy_is_exactly_thirty_distinct_names() {
        assert_eq!(ClauseType::ALL.len(), CLAUSE_TYPE_COUNT);
        let names: HashSet<&str> = ClauseType::ALL.iter().map(|ct| ct.name()).collect();
        assert_eq!(names.len(), CLAUSE_TYPE_COUNT);
    }

    #[test]
    fn strict_parse_round_trips_every_name() {
        for ct in ClauseType::ALL {
            assert_eq!(ct.name().parse::<ClauseType>(), Ok(ct));
        }
    }

    #[test]
    fn strict_parse_rejects_unknown_and_misfolded() {
        assert!("Force Majeure".parse::<ClauseType>().is_err());
        assert!("change of control".parse::<ClauseType>().is_err());
    }

    #[test]
    fn case_insensitive_lookup() {
        assert_eq!(
            ClauseType::parse_ci("change of control"),
            Some(ClauseType::ChangeOfControl)
        );
        assert_eq!(ClauseType::parse_ci("  Non-Compete "), Some(ClauseType::NonCompete));
        assert_eq!(ClauseType::parse_ci("Indemnity"), None);
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&ClauseType::RofrRofoRofn).unwrap();
        assert_eq!(json, "\"Rofr/Rofo/Rofn\"");
        let back: ClauseType = serde_json::from_str("\"Audit Rights\"").unwrap();
        assert_eq!(back, ClauseType::AuditRights);
        assert!(serde_json::from_str::<ClauseType>("\"Indemnity\"").is_err());
    }
}
