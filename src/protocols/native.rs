//! The tab-separated native metric parser.
//!
//! Plugins that do not speak prometheus emit one metric per line:
//!
//! - `<str:name>\t<str:type>\t<num:value>`
//! - `<str:name>\t<str:type>\t<num:value>\t<str:help>`
//!
//! `name` may end in a brace group (`{k="v",...}`) which is stripped and
//! carried as the tuple's label. Allowed types are `counter`, `gauge` and
//! `option`. Non-option names are prefixed with the caller's prefix,
//! typically `plugin_<name>_`, so plugin namespaces cannot collide with
//! built-in collectors.

use metric::{self, Metric, MetricKind};

/// Parse a native-format blob, appending tuples to `res`.
pub fn parse(
    source: &str,
    prefix: &str,
    res: &mut Vec<Metric>,
) -> Result<(), metric::Error> {
    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let raw_name = match fields.next() {
            Some(f) if !f.is_empty() => f,
            _ => {
                return Err(metric::Error::Malformed(
                    format!("native line missing name: {:?}", line),
                ))
            }
        };
        let raw_kind = fields.next();
        let raw_value = fields.next();
        let help = fields.next();

        let (base, label) = split_label(raw_name)?;
        if !metric::valid_name(base) {
            return Err(metric::Error::Malformed(
                format!("invalid metric name {:?}", base),
            ));
        }
        let kind = match raw_kind {
            Some("counter") => MetricKind::Counter,
            Some("gauge") => MetricKind::Gauge,
            Some("option") => MetricKind::Option,
            Some(other) => {
                return Err(metric::Error::Malformed(
                    format!("invalid metric type {:?}", other),
                ))
            }
            None => {
                return Err(metric::Error::Malformed(
                    format!("native line missing type: {:?}", line),
                ))
            }
        };
        let value = match raw_value {
            Some(v) if v.parse::<f64>().is_ok() => v,
            Some(v) => {
                return Err(metric::Error::Malformed(
                    format!("invalid metric value {:?}", v),
                ))
            }
            None => {
                return Err(metric::Error::Malformed(
                    format!("native line missing value: {:?}", line),
                ))
            }
        };
        let help = help.unwrap_or(base).to_string();
        let name = if kind == MetricKind::Option {
            base.to_string()
        } else {
            format!("{}{}", prefix, base)
        };
        let mut m = Metric::new(name, kind, value, help);
        if let Some(l) = label {
            m = m.label(l.to_string());
        }
        res.push(m);
    }
    Ok(())
}

/// Split a trailing brace group off a metric name.
fn split_label(raw: &str) -> Result<(&str, Option<&str>), metric::Error> {
    if !raw.ends_with('}') {
        return Ok((raw, None));
    }
    match raw.find('{') {
        Some(idx) if idx > 0 => Ok((&raw[..idx], Some(&raw[idx..]))),
        _ => Err(metric::Error::Malformed(
            format!("unbalanced label group in {:?}", raw),
        )),
    }
}
