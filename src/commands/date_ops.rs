use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Base de los números de serie de fecha de planilla (1899-12-30 = 0)
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

pub fn date_to_serial(date: NaiveDate) -> i64 {
    (date - serial_epoch()).num_days()
}

/// Número de serie → fecha (ignora la fracción horaria)
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    serial_epoch().checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Interpreta fechas en los formatos que llegan desde las planillas de gestión:
/// DD/MM/YYYY, DD-MM-YYYY, YYYY-MM-DD, con o sin hora, o número de serie.
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }

    // Patrón DD/MM/YYYY (o con guiones)
    if let Some(date) = try_day_first(v) {
        return Some(date);
    }

    if let Ok(date) = NaiveDate::parse_from_str(v, "%Y-%m-%d") {
        return Some(date);
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt.date());
        }
    }

    // Serial de planilla exportado como texto
    if v.chars().all(|c| c.is_ascii_digit() || c == '.') {
        if let Ok(serial) = v.parse::<f64>() {
            // Evita confundir RUTs u otros números largos con fechas
            if (20_000.0..=80_000.0).contains(&serial) {
                return serial_to_date(serial);
            }
        }
    }

    None
}

fn try_day_first(value: &str) -> Option<NaiveDate> {
    let sep = if value.contains('/') {
        '/'
    } else if value.contains('-') {
        '-'
    } else {
        return None;
    };

    let date_part = value.split_whitespace().next()?;
    let parts: Vec<&str> = date_part.split(sep).collect();
    if parts.len() != 3 || parts[0].len() > 2 {
        return None;
    }

    let (day, month, year) = (
        parts[0].parse::<u32>().ok()?,
        parts[1].parse::<u32>().ok()?,
        parts[2].parse::<i32>().ok()?,
    );
    let year = if year < 100 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_day_first_and_iso() {
        assert_eq!(parse_flexible_date("15/03/2025"), Some(d(2025, 3, 15)));
        assert_eq!(parse_flexible_date("5-3-2025"), Some(d(2025, 3, 5)));
        assert_eq!(parse_flexible_date("2025-03-15"), Some(d(2025, 3, 15)));
        assert_eq!(parse_flexible_date("15/03/2025 10:30"), Some(d(2025, 3, 15)));
        assert_eq!(parse_flexible_date("2025-03-15T08:00:00"), Some(d(2025, 3, 15)));
    }

    #[test]
    fn rejects_garbage_and_identity_numbers() {
        assert_eq!(parse_flexible_date(""), None);
        assert_eq!(parse_flexible_date("pendiente"), None);
        assert_eq!(parse_flexible_date("31/02/2025"), None);
        assert_eq!(parse_flexible_date("12345678"), None);
    }

    #[test]
    fn serial_numbers_round_trip() {
        let date = d(2025, 1, 1);
        let serial = date_to_serial(date);
        assert_eq!(serial, 45658);
        assert_eq!(serial_to_date(serial as f64), Some(date));
        assert_eq!(parse_flexible_date("45658"), Some(date));
    }
}
