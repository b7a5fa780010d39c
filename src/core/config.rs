//! Protocol configuration and parameters.
//!
//! Every economic constant the engine consults lives in `ProtocolParams`.
//! Defaults come from `utils::constants`; hosts may load overrides from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Economic parameters of a collateral branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Minimum collateral ratio (MCR)
    /// Below this, troves can be liquidated
    pub mcr: u128,

    /// Critical collateral ratio (CCR), reported by system state
    pub ccr: u128,

    /// Shutdown collateral ratio (SCR)
    pub scr: u128,

    /// Buffer above MCR required to join a batch
    pub bcr: u128,

    /// Penalty applied to debt offset by the stability pool
    pub liquidation_penalty_sp: u128,

    /// Penalty applied to redistributed debt
    pub liquidation_penalty_redistribution: u128,

    /// Minimum debt per trove
    pub min_debt: u128,

    /// Divisor for collateral gas compensation
    pub coll_gas_compensation_divisor: u128,

    /// Cap for collateral gas compensation
    pub coll_gas_compensation_cap: u128,

    /// Fixed redemption fee rate
    pub redemption_fee_rate: u128,

    /// Collateral bonus paid by urgent redemptions
    pub urgent_redemption_bonus: u128,

    /// Lowest allowed annual interest rate
    pub min_annual_interest_rate: u128,

    /// Highest allowed annual interest rate
    pub max_annual_interest_rate: u128,

    /// Highest allowed annual batch management fee
    pub max_annual_batch_management_fee: u128,

    /// Share of minted interest sent to stability pool depositors
    pub sp_yield_split: u128,

    /// Total deposits the stability pool never drops below
    pub min_bold_in_sp: u128,

    /// Period of interest charged upfront when debt is created (0 disables)
    pub upfront_interest_period_secs: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: MCR,
            ccr: CCR,
            scr: SCR,
            bcr: BCR,
            liquidation_penalty_sp: LIQUIDATION_PENALTY_SP,
            liquidation_penalty_redistribution: LIQUIDATION_PENALTY_REDISTRIBUTION,
            min_debt: MIN_DEBT,
            coll_gas_compensation_divisor: COLL_GAS_COMPENSATION_DIVISOR,
            coll_gas_compensation_cap: COLL_GAS_COMPENSATION_CAP,
            redemption_fee_rate: REDEMPTION_FEE_RATE,
            urgent_redemption_bonus: URGENT_REDEMPTION_BONUS,
            min_annual_interest_rate: MIN_ANNUAL_INTEREST_RATE,
            max_annual_interest_rate: MAX_ANNUAL_INTEREST_RATE,
            max_annual_batch_management_fee: MAX_ANNUAL_BATCH_MANAGEMENT_FEE,
            sp_yield_split: SP_YIELD_SPLIT,
            min_bold_in_sp: MIN_BOLD_IN_SP,
            upfront_interest_period_secs: UPFRONT_INTEREST_PERIOD_SECS,
        }
    }
}

impl ProtocolParams {
    /// Create with custom MCR (for testing)
    pub fn with_mcr(mut self, mcr: u128) -> Self {
        self.mcr = mcr;
        self
    }

    /// Charge `secs` of interest upfront on new debt
    pub fn with_upfront_interest_period(mut self, secs: u64) -> Self {
        self.upfront_interest_period_secs = secs;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Err(Error::InvalidConfig(reason.to_string()));

        if self.mcr <= ONE_HUNDRED_PCT {
            return fail("mcr must exceed 100%");
        }
        if self.scr >= self.mcr {
            return fail("scr must be below mcr");
        }
        if self.ccr <= self.mcr {
            return fail("ccr must exceed mcr");
        }
        if self.liquidation_penalty_sp > self.liquidation_penalty_redistribution {
            return fail("sp penalty must not exceed redistribution penalty");
        }
        if self.liquidation_penalty_redistribution >= ONE_HUNDRED_PCT {
            return fail("redistribution penalty must be below 100%");
        }
        if self.coll_gas_compensation_divisor == 0 {
            return fail("gas compensation divisor must be non-zero");
        }
        if self.min_debt == 0 {
            return fail("min_debt must be non-zero");
        }
        if self.min_annual_interest_rate == 0
            || self.min_annual_interest_rate > self.max_annual_interest_rate
        {
            return fail("interest rate bounds are inverted or zero");
        }
        if self.redemption_fee_rate >= ONE_HUNDRED_PCT {
            return fail("redemption fee must be below 100%");
        }
        if self.sp_yield_split > ONE_HUNDRED_PCT {
            return fail("sp yield split must not exceed 100%");
        }
        if self.min_bold_in_sp == 0 {
            return fail("min_bold_in_sp must be non-zero");
        }
        Ok(())
    }

    /// Check an annual interest rate against the configured bounds
    pub fn require_valid_interest_rate(&self, rate: u128) -> Result<()> {
        if rate < self.min_annual_interest_rate || rate > self.max_annual_interest_rate {
            return Err(Error::InterestRateOutOfBounds {
                rate,
                min: self.min_annual_interest_rate,
                max: self.max_annual_interest_rate,
            });
        }
        Ok(())
    }

    /// Parse parameters from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_params_valid() {
        let params = ProtocolParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.mcr, MCR);
        assert_eq!(params.min_debt, MIN_DEBT);
    }

    #[test]
    fn test_invalid_params() {
        let params = ProtocolParams::default().with_mcr(ONE_HUNDRED_PCT);
        assert!(matches!(params.validate(), Err(Error::InvalidConfig(_))));

        let mut params = ProtocolParams::default();
        params.coll_gas_compensation_divisor = 0;
        assert!(params.validate().is_err());

        let mut params = ProtocolParams::default();
        params.min_annual_interest_rate = params.max_annual_interest_rate + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_interest_rate_bounds() {
        let params = ProtocolParams::default();
        assert!(params.require_valid_interest_rate(MIN_ANNUAL_INTEREST_RATE).is_ok());
        assert!(params.require_valid_interest_rate(MAX_ANNUAL_INTEREST_RATE).is_ok());
        assert!(matches!(
            params.require_valid_interest_rate(MIN_ANNUAL_INTEREST_RATE - 1),
            Err(Error::InterestRateOutOfBounds { .. })
        ));
        assert!(params.require_valid_interest_rate(MAX_ANNUAL_INTEREST_RATE + 1).is_err());
    }

    #[test]
    fn test_json_partial_override() {
        let json = r#"{ "upfront_interest_period_secs": 604800 }"#;
        let params = ProtocolParams::from_json_str(json).unwrap();
        assert_eq!(params.upfront_interest_period_secs, 604_800);
        assert_eq!(params.mcr, MCR);
    }

    #[test]
    fn test_json_rejects_invalid() {
        let json = r#"{ "scr": 2000000000000000000 }"#;
        assert!(ProtocolParams::from_json_str(json).is_err());
        assert!(matches!(
            ProtocolParams::from_json_str("not json"),
            Err(Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_json_file_roundtrip() {
        let params = ProtocolParams::default().with_upfront_interest_period(3600);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(params.to_json().unwrap().as_bytes()).unwrap();

        let loaded = ProtocolParams::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, params);
    }
}
