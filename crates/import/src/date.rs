use std::sync::OnceLock;

use regex::Regex;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_ymd_slash, r"^([0-9]{4})/([0-9]{1,2})/([0-9]{1,2})$");
re!(re_ymd_dash, r"^([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})$");
re!(re_mdy_slash, r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})$");

#[derive(Clone, Copy)]
enum Order {
    YearMonthDay,
    MonthDayYear,
}

/// Tried in order; the first pattern that matches decides the reading.
fn patterns() -> [(&'static Regex, Order); 3] {
    [
        (re_ymd_slash(), Order::YearMonthDay),
        (re_ymd_dash(), Order::YearMonthDay),
        (re_mdy_slash(), Order::MonthDayYear),
    ]
}

/// Normalizes a statement date cell to `YYYY/MM/DD`.
///
/// Accepts `YYYY/M/D`, `YYYY-M-D` and `M/D/YYYY`. Month and day are only
/// zero-padded, never range-checked. Returns `None` for anything else so the
/// caller can move on to the next column.
pub fn normalize_date(cell: &str) -> Option<String> {
    let cell = cell.trim();
    for (re, order) in patterns() {
        let Some(caps) = re.captures(cell) else {
            continue;
        };
        let (year, month, day) = match order {
            Order::YearMonthDay => (&caps[1], &caps[2], &caps[3]),
            Order::MonthDayYear => (&caps[3], &caps[1], &caps[2]),
        };
        return Some(format!("{year}/{month:0>2}/{day:0>2}"));
    }
    None
}

re!(re_raw_date, r"^[0-9]{4}/[0-9]{1,2}/[0-9]{1,2}$");

/// Raw `YYYY/M/D` shape check used by the first-cell gate.
pub fn looks_like_raw_date(cell: &str) -> bool {
    re_raw_date().is_match(cell.trim())
}
