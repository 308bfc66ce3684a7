use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::validation::validate_amount;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    None,
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(DomainError::validation(
                "discount_type",
                format!("unsupported discount type `{other}` (expected none|percentage|fixed)"),
            )),
        }
    }
}

/// Discount rule attached to a quote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    Percentage(Decimal),
    Fixed(Decimal),
}

impl Discount {
    pub fn from_parts(kind: DiscountType, value: Decimal) -> Self {
        match kind {
            DiscountType::None => Self::None,
            DiscountType::Percentage => Self::Percentage(value),
            DiscountType::Fixed => Self::Fixed(value),
        }
    }

    pub fn kind(&self) -> DiscountType {
        match self {
            Self::None => DiscountType::None,
            Self::Percentage(_) => DiscountType::Percentage,
            Self::Fixed(_) => DiscountType::Fixed,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Self::None => Decimal::ZERO,
            Self::Percentage(value) | Self::Fixed(value) => *value,
        }
    }

    /// Same rule on create and edit: percentages within 0..=100, fixed >= 0.
    pub fn validate(self) -> Result<Self, DomainError> {
        match self {
            Self::None => Ok(Self::None),
            Self::Percentage(value) => {
                if (value.is_sign_negative() && !value.is_zero()) || value > ONE_HUNDRED {
                    return Err(DomainError::validation(
                        "discount_value",
                        "percentage discount must be between 0 and 100",
                    ));
                }
                Ok(Self::Percentage(value.normalize()))
            }
            Self::Fixed(value) => Ok(Self::Fixed(validate_amount("discount_value", value)?)),
        }
    }
}

pub trait PricedLine {
    fn quantity(&self) -> u32;
    fn unit_price(&self) -> Decimal;

    /// Saturates at `Decimal::MAX`; validated input never gets close.
    fn line_total(&self) -> Decimal {
        self.unit_price().checked_mul(Decimal::from(self.quantity())).unwrap_or(Decimal::MAX)
    }
}

impl PricedLine for (u32, Decimal) {
    fn quantity(&self) -> u32 {
        self.0
    }

    fn unit_price(&self) -> Decimal {
        self.1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub const ZERO: Self =
        Self { subtotal: Decimal::ZERO, discount: Decimal::ZERO, total: Decimal::ZERO };
}

/// Derives subtotal, discount and total from line items.
///
/// Shared by form previews and persisted quote reads so both always agree.
/// The discount is kept within `[0, subtotal]`, so the total is never negative.
pub fn compute_totals<L: PricedLine>(lines: &[L], discount: &Discount) -> Totals {
    let subtotal = lines
        .iter()
        .map(PricedLine::line_total)
        .fold(Decimal::ZERO, |sum, line| sum.checked_add(line).unwrap_or(Decimal::MAX));

    let raw_discount = match discount {
        Discount::None => Decimal::ZERO,
        Discount::Percentage(percent) => {
            (*percent / ONE_HUNDRED).checked_mul(subtotal).unwrap_or(subtotal)
        }
        Discount::Fixed(amount) => *amount,
    };
    let discount = round_money(raw_discount).max(Decimal::ZERO).min(subtotal);

    Totals { subtotal, discount, total: subtotal - discount }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{compute_totals, Discount, DiscountType, PricedLine, Totals};

    fn lines() -> Vec<(u32, Decimal)> {
        vec![(3, Decimal::new(10000, 2)), (2, Decimal::new(1999, 2))]
    }

    #[test]
    fn consulting_scenario_applies_fixed_discount() {
        let totals = compute_totals(&[(3, Decimal::new(10000, 2))], &Discount::Fixed(Decimal::new(50, 0)));

        assert_eq!(totals.subtotal, Decimal::new(30000, 2));
        assert_eq!(totals.discount, Decimal::new(5000, 2));
        assert_eq!(totals.total, Decimal::new(25000, 2));
    }

    #[test]
    fn fixed_discount_larger_than_subtotal_is_clamped() {
        let subtotal = Decimal::new(33998, 2);
        let totals = compute_totals(&lines(), &Discount::Fixed(Decimal::new(1_000_000, 2)));

        assert_eq!(totals.subtotal, subtotal);
        assert_eq!(totals.discount, subtotal);
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn full_percentage_discount_zeroes_the_total() {
        let totals = compute_totals(&lines(), &Discount::Percentage(Decimal::ONE_HUNDRED));
        assert_eq!(totals.total, Decimal::ZERO);
    }

    #[test]
    fn zero_percentage_matches_no_discount() {
        assert_eq!(
            compute_totals(&lines(), &Discount::Percentage(Decimal::ZERO)),
            compute_totals(&lines(), &Discount::None)
        );
    }

    #[test]
    fn percentage_discount_rounds_to_cents() {
        let totals = compute_totals(&[(1, Decimal::new(1001, 2))], &Discount::Percentage(Decimal::new(15, 0)));

        assert_eq!(totals.discount, Decimal::new(150, 2));
        assert_eq!(totals.total, Decimal::new(851, 2));
    }

    #[test]
    fn empty_items_yield_zero_totals() {
        let empty: Vec<(u32, Decimal)> = Vec::new();
        assert_eq!(compute_totals(&empty, &Discount::Fixed(Decimal::TEN)), Totals::ZERO);
    }

    #[test]
    fn percentage_above_one_hundred_is_rejected() {
        assert!(Discount::Percentage(Decimal::new(1001, 1)).validate().is_err());
        assert!(Discount::Percentage(Decimal::new(-1, 0)).validate().is_err());
        assert!(Discount::Percentage(Decimal::ONE_HUNDRED).validate().is_ok());
        assert!(Discount::Fixed(Decimal::new(-5, 0)).validate().is_err());
    }

    #[test]
    fn discount_type_parses_storage_labels() {
        assert_eq!("percentage".parse::<DiscountType>().expect("parse"), DiscountType::Percentage);
        assert_eq!("".parse::<DiscountType>().expect("parse"), DiscountType::None);
        assert!("bogus".parse::<DiscountType>().is_err());
        assert_eq!(Discount::from_parts(DiscountType::Fixed, Decimal::TEN).kind(), DiscountType::Fixed);
    }

    #[test]
    fn oversized_stored_lines_saturate_instead_of_overflowing() {
        let huge = [(u32::MAX, Decimal::MAX), (u32::MAX, Decimal::MAX)];
        assert_eq!(huge[0].line_total(), Decimal::MAX);

        let totals = compute_totals(&huge, &Discount::Percentage(Decimal::new(50, 0)));

        assert_eq!(totals.subtotal, Decimal::MAX);
        assert!(totals.discount <= totals.subtotal);
        assert_eq!(totals.total, totals.subtotal - totals.discount);
    }
}
