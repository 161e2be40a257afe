use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Fixed-point monetary amount in minor currency units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(pub i64);

impl Money {
    pub const SCALE: i64 = 100; // 2 decimal places
    pub const TARGET_DECIMALS: u32 = 2;
    pub const ZERO: Money = Money(0);

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Percentage of this amount, rounded to the minor unit.
    /// Uses bankers rounding so quote-time and settlement-time calls agree.
    pub fn percent(self, pct: u32) -> Option<Self> {
        let fee = Decimal::from(self.0) * Decimal::from(pct) / Decimal::from(100u32);
        fee.round().to_i64().map(Self)
    }

    pub fn from_scaled_i128(value: i128, scale: u32) -> Option<Self> {
        if scale <= Self::TARGET_DECIMALS {
            let factor = 10i128.checked_pow(Self::TARGET_DECIMALS - scale)?;
            let widened = value.checked_mul(factor)?;
            return i64::try_from(widened).ok().map(Self);
        }
        // scale > TARGET_DECIMALS: round half to even at the minor unit
        let factor = 10i128.pow(scale - Self::TARGET_DECIMALS);
        let div = value / factor;
        let rem = value % factor;
        let half = factor / 2;
        let bump = match rem.abs().cmp(&half) {
            core::cmp::Ordering::Greater => 1,
            core::cmp::Ordering::Equal if div & 1 != 0 => 1,
            _ => 0,
        };
        let adjusted = div + bump * value.signum();
        i64::try_from(adjusted).ok().map(Self)
    }

    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let neg = s.starts_with('-');
        let body = s.strip_prefix('-').unwrap_or(s);
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut raw: i128 = int_part.parse().ok()?;
        let mut scale = 0u32;
        if !frac_part.is_empty() {
            if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let shift = 10i128.checked_pow(frac_part.len() as u32)?;
            raw = raw
                .checked_mul(shift)?
                .checked_add(frac_part.parse().ok()?)?;
            scale = frac_part.len() as u32;
        }
        let signed = if neg { -raw } else { raw };
        Self::from_scaled_i128(signed, scale)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let abs = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / Self::SCALE as u64,
            abs % Self::SCALE as u64
        )
    }
}
