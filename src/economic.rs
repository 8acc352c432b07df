//! Subsidy schedule

use crate::chain_params::ChainParams;
use crate::types::{Integer, Natural};

/// Block subsidy at `height`: the base subsidy halved once per
/// `subsidy_halving_interval` blocks, zero after 64 halvings
///
/// An interval of zero means the subsidy never halves.
pub fn get_block_subsidy(height: Natural, params: &ChainParams) -> Integer {
    if params.subsidy_halving_interval == 0 {
        return params.base_subsidy;
    }
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    params.base_subsidy >> halvings
}

/// Sum of every subsidy from genesis through `height`
pub fn total_supply(height: Natural, params: &ChainParams) -> Integer {
    let mut total: Integer = 0;
    let mut h: Natural = 0;
    while h <= height {
        let subsidy = get_block_subsidy(h, params);
        if subsidy == 0 {
            break;
        }
        // Whole halving eras at a time
        let era_end = match params.subsidy_halving_interval {
            0 => height,
            interval => ((h / interval + 1) * interval - 1).min(height),
        };
        let blocks = (era_end - h + 1) as Integer;
        total = total.saturating_add(subsidy.saturating_mul(blocks));
        h = era_end + 1;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INITIAL_SUBSIDY, MAX_MONEY};

    #[test]
    fn test_subsidy_halving() {
        let params = ChainParams::mainnet();
        assert_eq!(get_block_subsidy(0, &params), INITIAL_SUBSIDY);
        assert_eq!(get_block_subsidy(209_999, &params), INITIAL_SUBSIDY);
        assert_eq!(get_block_subsidy(210_000, &params), INITIAL_SUBSIDY / 2);
        assert_eq!(get_block_subsidy(420_000, &params), INITIAL_SUBSIDY / 4);
        assert_eq!(get_block_subsidy(210_000 * 64, &params), 0);
    }

    #[test]
    fn test_regtest_halves_fast() {
        let params = ChainParams::regtest();
        assert_eq!(get_block_subsidy(149, &params), INITIAL_SUBSIDY);
        assert_eq!(get_block_subsidy(150, &params), INITIAL_SUBSIDY / 2);
    }

    #[test]
    fn test_total_supply_bounded() {
        let params = ChainParams::mainnet();
        assert_eq!(total_supply(0, &params), INITIAL_SUBSIDY);
        assert_eq!(total_supply(1, &params), 2 * INITIAL_SUBSIDY);
        let all = total_supply(210_000 * 70, &params);
        assert!(all <= MAX_MONEY);
        assert!(all > MAX_MONEY - 100 * 100_000_000);
    }
}
