//! Julian date to time-axis cell.
//!
//! The time axis counts microseconds since JD 0 in the map's time scale
//! (TCB unless the map says otherwise). At order 61 one cell is one
//! microsecond, so the axis spans `2^61` µs, about 73 000 years.

use crate::dim::Dimension;
use crate::error::{MocError, Result};

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Largest Julian date representable on the time axis (exclusive).
pub fn max_jd() -> f64 {
    Dimension::Time.domain_end() as f64 / MICROS_PER_DAY
}

/// Microsecond index of `jd` at the finest order.
pub fn jd_to_micros(jd: f64) -> Result<u64> {
    if !jd.is_finite() || jd < 0.0 || jd >= max_jd() {
        return Err(MocError::InvalidCoordinate(format!(
            "Julian date {jd} is outside [0, {})",
            max_jd()
        )));
    }
    let micros = (jd * MICROS_PER_DAY) as u64;
    Ok(micros.min(Dimension::Time.domain_end() - 1))
}

/// Time cell containing `jd` at `order`.
pub fn jd_to_cell(order: u8, jd: f64) -> Result<u64> {
    Dimension::Time.check_order(order)?;
    Ok(Dimension::Time.cell_of(order, jd_to_micros(jd)?))
}

/// Julian date bounds `[start, end)` of a time cell.
pub fn cell_to_jd(order: u8, cell: u64) -> Result<(f64, f64)> {
    let iv = Dimension::Time.to_flat(order, cell)?;
    Ok((
        iv.start as f64 / MICROS_PER_DAY,
        iv.end as f64 / MICROS_PER_DAY,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const J2000: f64 = 2_451_545.0;

    #[test]
    fn finest_order_is_one_microsecond() {
        let cell = jd_to_cell(61, 1.0).unwrap();
        assert_eq!(cell, 86_400_000_000);
    }

    #[test]
    fn coarser_orders_shift_down() {
        let fine = jd_to_cell(61, J2000).unwrap();
        for order in [0u8, 10, 30, 45, 60] {
            assert_eq!(jd_to_cell(order, J2000).unwrap(), fine >> (61 - order));
        }
    }

    #[test]
    fn cell_bounds_contain_the_date() {
        let cell = jd_to_cell(20, J2000).unwrap();
        let (start, end) = cell_to_jd(20, cell).unwrap();
        assert!(start <= J2000 && J2000 < end);
    }

    #[test]
    fn order_zero_is_one_cell() {
        assert_eq!(jd_to_cell(0, J2000).unwrap(), 0);
        let (start, end) = cell_to_jd(0, 0).unwrap();
        assert_eq!(start, 0.0);
        assert_eq!(end, max_jd());
    }

    #[test]
    fn rejects_dates_off_the_axis() {
        assert!(jd_to_cell(10, -1.0).is_err());
        assert!(jd_to_cell(10, f64::INFINITY).is_err());
        assert!(jd_to_cell(10, max_jd()).is_err());
        assert!(matches!(
            jd_to_cell(62, J2000),
            Err(MocError::InvalidOrder { order: 62, max: 61 })
        ));
    }
}
