//! Numeric types shared by the whole simulation. No floats in the tick path.

use fixed::types::I32F32;

/// Q32.32 fixed point for energy, velocity and other fractional quantities.
pub type Fixed64 = I32F32;

/// Completed simulation steps.
pub type Ticks = u32;

/// Tenths of a dollar.
pub type Money = i64;

/// Whole dollars as [`Money`].
#[inline]
pub const fn money(dollars: i64) -> Money {
    dollars * 10
}

/// Raw bits of a [`Fixed64`], as written into entity images.
#[inline]
pub fn fixed64_bits(v: Fixed64) -> i64 {
    v.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_tenths() {
        assert_eq!(money(5), 50);
        assert_eq!(money(-2), -20);
    }

    #[test]
    fn fixed_bits_are_exact() {
        let third = Fixed64::from_num(1) / Fixed64::from_num(3);
        assert_eq!(fixed64_bits(third), fixed64_bits(Fixed64::from_num(1) / Fixed64::from_num(3)));
        assert_eq!(fixed64_bits(Fixed64::from_num(1)), 1i64 << 32);
    }
}
