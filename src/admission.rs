//! Admission validation for auctioneer configurations
//!
//! Pure function over a proposed configuration and the configurations
//! already present; never touches records, idempotent. Keeping this at
//! admission time is what guarantees at most one auctioneer per scope and
//! a consistent order policy.

use crate::error::Error;
use crate::model::AuctioneerConfig;

pub fn validate_auctioneer_config(
    proposed: &AuctioneerConfig,
    existing: &[AuctioneerConfig],
) -> Result<(), Error> {
    for other in existing {
        let same_record = other.meta.name == proposed.meta.name
            && other.meta.namespace == proposed.meta.namespace;
        if !same_record && other.spec.scope == proposed.spec.scope {
            return Err(Error::ValidationError(format!(
                "auctioneer {:?} already owns scope {}",
                other.meta.name, other.spec.scope
            )));
        }
    }

    let policy = &proposed.spec.policy;
    if policy.min_orders_per_robot < 1 {
        return Err(Error::ValidationError(format!(
            "min_orders_per_robot {} < 1",
            policy.min_orders_per_robot
        )));
    }
    if policy.max_orders_per_robot < policy.min_orders_per_robot {
        return Err(Error::ValidationError(format!(
            "max_orders_per_robot {} < min_orders_per_robot {}",
            policy.max_orders_per_robot, policy.min_orders_per_robot
        )));
    }
    if policy.min_orders_per_auction < 1 {
        return Err(Error::ValidationError(format!(
            "min_orders_per_auction {} < 1",
            policy.min_orders_per_auction
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuctionPolicy, Scope};

    fn config(name: &str, scope: Scope) -> AuctioneerConfig {
        AuctioneerConfig::new(
            name,
            scope,
            AuctionPolicy {
                max_orders_per_robot: 2,
                min_orders_per_robot: 1,
                min_orders_per_auction: 1,
            },
        )
    }

    #[test]
    fn accepts_unique_scope() {
        let proposed = config("auctioneer-a", Scope::new("W1", "RB", "G1"));
        let existing = vec![config("auctioneer-b", Scope::new("W1", "RB", "G2"))];
        assert!(validate_auctioneer_config(&proposed, &existing).is_ok());
    }

    #[test]
    fn rejects_second_auctioneer_for_same_scope() {
        let proposed = config("auctioneer-a", Scope::new("W1", "RB", "G1"));
        let existing = vec![config("auctioneer-b", Scope::new("W1", "RB", "G1"))];
        let err = validate_auctioneer_config(&proposed, &existing).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn accepts_update_of_the_same_record() {
        let proposed = config("auctioneer-a", Scope::new("W1", "RB", "G1"));
        let existing = vec![config("auctioneer-a", Scope::new("W1", "RB", "G1"))];
        assert!(validate_auctioneer_config(&proposed, &existing).is_ok());
    }

    #[test]
    fn rejects_inconsistent_order_policy() {
        let mut proposed = config("auctioneer-a", Scope::new("W1", "RB", "G1"));
        proposed.spec.policy.max_orders_per_robot = 1;
        proposed.spec.policy.min_orders_per_robot = 3;
        assert!(validate_auctioneer_config(&proposed, &[]).is_err());

        proposed.spec.policy.max_orders_per_robot = 3;
        proposed.spec.policy.min_orders_per_robot = 0;
        assert!(validate_auctioneer_config(&proposed, &[]).is_err());

        proposed.spec.policy.min_orders_per_robot = 1;
        proposed.spec.policy.min_orders_per_auction = 0;
        assert!(validate_auctioneer_config(&proposed, &[]).is_err());
    }
}
