//! es-AR number formatting: `.` groups thousands, `,` marks decimals.

/// Placeholder shown wherever a value is absent.
pub const MISSING: &str = "—";

/// Swap separators of an en-US grouped number ("1,234.5" -> "1.234,5").
fn to_es(grouped: &str) -> String {
    grouped
        .chars()
        .map(|c| match c {
            ',' => '.',
            '.' => ',',
            other => other,
        })
        .collect()
}

/// Group the integer part of a plain decimal string with commas.
fn group_thousands(plain: &str) -> String {
    let (sign, digits) = match plain.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", plain),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn present(x: Option<f64>) -> Option<f64> {
    x.filter(|v| !v.is_nan())
}

/// Integer with thousands separators: 1234567.4 -> "1.234.567".
pub fn fmt_int_es(x: Option<f64>) -> String {
    match present(x) {
        Some(v) => {
            let rounded = format!("{:.0}", v);
            // "-0" after rounding small negatives
            let rounded = if rounded == "-0" { "0".to_string() } else { rounded };
            to_es(&group_thousands(&rounded))
        }
        None => MISSING.to_string(),
    }
}

/// Percentage without sign prefix: 70.0 -> "70,0%".
pub fn fmt_pct_plain(x: Option<f64>, digits: usize) -> String {
    match present(x) {
        Some(v) => format!("{:.*}%", digits, v).replace('.', ","),
        None => MISSING.to_string(),
    }
}

/// Percentage with explicit sign for non-negative values: 3.2 -> "+3,2%".
pub fn fmt_pct_es(x: Option<f64>, digits: usize) -> String {
    match present(x) {
        Some(v) => {
            let sign = if v >= 0.0 { "+" } else { "" };
            format!("{}{:.*}%", sign, digits, v).replace('.', ",")
        }
        None => MISSING.to_string(),
    }
}

/// Comparison-table cell: large magnitudes as integers, the rest with two decimals.
pub fn fmt_decimal_es(x: Option<f64>) -> String {
    match present(x) {
        Some(v) if v.abs() >= 1000.0 => fmt_int_es(Some(v)),
        Some(v) => to_es(&group_thousands(&format!("{:.2}", v))),
        None => MISSING.to_string(),
    }
}

/// Cut a label to `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Ratio-or-percentage heuristic: magnitudes up to 1.5 are treated as ratios.
pub fn pctize(v: f64) -> f64 {
    if v.abs() <= 1.5 {
        v * 100.0
    } else {
        v
    }
}
