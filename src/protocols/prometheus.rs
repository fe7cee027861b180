//! The prometheus text protocol parser. Defined here:
//! https://prometheus.io/docs/instrumenting/exposition_formats/#text-based-format
//!
//! One extension on top of the stock format: lines of the form
//! `# OPTION <name> <value>` may appear before any metric. The only
//! recognized option is `ttl`, an integer number of seconds that
//! overrides the producing collector's cache TTL for the current result;
//! it is surfaced as an option tuple and never reaches the poller.
//!
//! Value lines are not reinterpreted: everything between one family's
//! metadata and the next accumulates verbatim into the tuple's value
//! block, labels, timestamps and all, so serialization cannot reformat
//! what the producer wrote. A value block with no preceding `# TYPE` is
//! an error, as is any `# ` line that is not HELP, TYPE or OPTION.

use metric::{self, Metric, MetricKind};

struct Family {
    name: String,
    kind: Option<MetricKind>,
    help: Option<String>,
    values: Vec<String>,
}

/// Parse a prometheus text blob, appending tuples to `res`.
///
/// `prefix` is not applied to names -- prometheus-speaking producers are
/// expected to namespace themselves -- but it is stripped from the front
/// of a family name to build the default help text when `# HELP` is
/// absent.
pub fn parse(
    source: &str,
    prefix: &str,
    res: &mut Vec<Metric>,
) -> Result<(), metric::Error> {
    let mut current: Option<Family> = None;
    let mut seen_family = false;
    for raw_line in source.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("# OPTION ") {
            if seen_family {
                return Err(metric::Error::Malformed(
                    "OPTION after metric data".to_string(),
                ));
            }
            let mut parts = line[9..].split_whitespace();
            let name = parts.next().unwrap_or("");
            let value = match parts.next() {
                Some(v) => v,
                None => {
                    return Err(metric::Error::Malformed(
                        format!("OPTION missing value: {:?}", line),
                    ))
                }
            };
            if name == "ttl" {
                if value.parse::<i64>().is_err() {
                    return Err(metric::Error::Malformed(
                        format!("option ttl is not an integer: {:?}", value),
                    ));
                }
                res.push(Metric::new("ttl", MetricKind::Option, value, "ttl"));
            }
            continue;
        }
        if line.starts_with("# HELP ") {
            let (name, payload) = split_metadata(&line[7..])?;
            current = transition(current, name, prefix, res)?;
            seen_family = true;
            if let Some(ref mut fam) = current {
                if fam.help.is_none() {
                    fam.help = Some(payload.to_string());
                }
            }
            continue;
        }
        if line.starts_with("# TYPE ") {
            let (name, payload) = split_metadata(&line[7..])?;
            let kind = match payload {
                "counter" => MetricKind::Counter,
                "gauge" => MetricKind::Gauge,
                "histogram" => MetricKind::Histogram,
                other => {
                    return Err(metric::Error::Malformed(
                        format!("invalid metric type {:?}", other),
                    ))
                }
            };
            current = transition(current, name, prefix, res)?;
            seen_family = true;
            if let Some(ref mut fam) = current {
                if fam.kind.is_none() {
                    fam.kind = Some(kind);
                }
            }
            continue;
        }
        if line.starts_with('#') {
            return Err(metric::Error::Malformed(
                format!("unexpected comment line {:?}", line),
            ));
        }
        // value line
        match current {
            Some(ref mut fam) if fam.kind.is_some() => {
                fam.values.push(line.to_string());
            }
            _ => {
                return Err(metric::Error::Malformed(
                    format!("value line with no preceding # TYPE: {:?}", line),
                ))
            }
        }
    }
    if let Some(fam) = current {
        res.push(flush(fam, prefix)?);
    }
    Ok(())
}

/// Split `<name> <rest>` off a metadata line, validating the name.
fn split_metadata(rest: &str) -> Result<(&str, &str), metric::Error> {
    let mut it = rest.splitn(2, ' ');
    let name = it.next().unwrap_or("");
    if !metric::valid_name(name) {
        return Err(metric::Error::Malformed(
            format!("invalid metric name {:?}", name),
        ));
    }
    Ok((name, it.next().unwrap_or("").trim()))
}

/// Close the current family if `name` begins a new one.
fn transition(
    current: Option<Family>,
    name: &str,
    prefix: &str,
    res: &mut Vec<Metric>,
) -> Result<Option<Family>, metric::Error> {
    match current {
        Some(fam) => {
            if fam.name == name {
                Ok(Some(fam))
            } else {
                res.push(flush(fam, prefix)?);
                Ok(Some(new_family(name)))
            }
        }
        None => Ok(Some(new_family(name))),
    }
}

fn new_family(name: &str) -> Family {
    Family {
        name: name.to_string(),
        kind: None,
        help: None,
        values: Vec::new(),
    }
}

fn flush(fam: Family, prefix: &str) -> Result<Metric, metric::Error> {
    let kind = match fam.kind {
        Some(k) => k,
        None => {
            return Err(metric::Error::Malformed(
                format!("metric {} has no # TYPE", fam.name),
            ))
        }
    };
    let help = match fam.help {
        Some(h) => h,
        None => if !prefix.is_empty() && fam.name.starts_with(prefix) {
            fam.name[prefix.len()..].to_string()
        } else {
            fam.name.clone()
        },
    };
    Ok(
        Metric::new(fam.name, kind, fam.values.join("\n"), help).prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric::Format;
    use quickcheck::{QuickCheck, TestResult};

    fn parse_ok(source: &str, prefix: &str) -> Vec<Metric> {
        let mut res = Vec::new();
        parse(source, prefix, &mut res).unwrap();
        res
    }

    #[test]
    fn test_single_family() {
        let res = parse_ok(
            "# HELP web_hits_total total hits\n\
             # TYPE web_hits_total counter\n\
             web_hits_total 131\n",
            "",
        );
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].name, "web_hits_total");
        assert_eq!(res[0].kind, MetricKind::Counter);
        assert_eq!(res[0].value, "web_hits_total 131");
        assert_eq!(res[0].help, "total hits");
        assert_eq!(res[0].format, Format::Prometheus);
    }

    #[test]
    fn test_multiple_series_accumulate_verbatim() {
        let res = parse_ok(
            "# TYPE reqs counter\n\
             reqs{code=\"200\"} 10 1500000000\n\
             reqs{code=\"500\"} 2\n",
            "",
        );
        assert_eq!(res.len(), 1);
        assert_eq!(
            res[0].value,
            "reqs{code=\"200\"} 10 1500000000\nreqs{code=\"500\"} 2"
        );
    }

    #[test]
    fn test_help_defaults_to_unprefixed_name() {
        let res = parse_ok(
            "# TYPE plugin_decay_rot gauge\nplugin_decay_rot 66\n",
            "plugin_decay_",
        );
        assert_eq!(res[0].help, "rot");
    }

    #[test]
    fn test_option_ttl_before_metrics() {
        let res = parse_ok(
            "# OPTION ttl 90201\n\
             # TYPE rot gauge\n\
             rot 66\n",
            "",
        );
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].kind, MetricKind::Option);
        assert_eq!(res[0].name, "ttl");
        assert_eq!(res[0].value, "90201");
        assert_eq!(res[1].name, "rot");
    }

    #[test]
    fn test_unknown_option_is_ignored() {
        let res = parse_ok("# OPTION frobnicate yes\n# TYPE a gauge\na 1\n", "");
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].name, "a");
    }

    #[test]
    fn test_option_after_metrics_is_rejected() {
        let mut res = Vec::new();
        let input = "# TYPE a gauge\na 1\n# OPTION ttl 30\n";
        match parse(input, "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_option_ttl_must_be_integer() {
        let mut res = Vec::new();
        match parse("# OPTION ttl ninety\n", "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_value_without_type_is_rejected() {
        let mut res = Vec::new();
        match parse("orphan 12\n", "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_help_only_family_is_rejected() {
        let mut res = Vec::new();
        match parse("# HELP a help text\na 1\n", "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_stray_comment_is_rejected() {
        let mut res = Vec::new();
        match parse("# TYPE a gauge\na 1\n# EOF\n", "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_type_is_rejected() {
        let mut res = Vec::new();
        match parse("# TYPE a summary\na 1\n", "", &mut res) {
            Err(metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_help_then_type_merge() {
        let res = parse_ok(
            "# HELP a first help\n# TYPE a gauge\na 1\n",
            "",
        );
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].help, "first help");
        assert_eq!(res[0].kind, MetricKind::Gauge);
    }

    // Round-trip: parse, serialize, parse again; families survive with
    // identical (name, kind, value-block) content.
    #[test]
    fn test_round_trip_qc() {
        fn inner(spec: Vec<(u8, u8)>) -> TestResult {
            if spec.is_empty() || spec.len() > 12 {
                return TestResult::discard();
            }
            let mut text = String::new();
            let mut expected = 0;
            let mut seen = Vec::new();
            for &(n, v) in &spec {
                let name = format!("family_{}", n);
                if seen.contains(&name) {
                    continue;
                }
                seen.push(name.clone());
                expected += 1;
                let kind = if n % 2 == 0 { "counter" } else { "gauge" };
                text.push_str(&format!("# TYPE {} {}\n", name, kind));
                text.push_str(&format!("{}{{shard=\"a\"}} {}\n", name, v));
                text.push_str(&format!("{}{{shard=\"b\"}} {}\n", name, u32::from(v) + 1));
            }
            if expected == 0 {
                return TestResult::discard();
            }
            let first = parse_ok(&text, "");
            assert_eq!(first.len(), expected);
            let emitted = ::metric::emit(&first).unwrap();
            let second = parse_ok(&emitted, "");
            assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(second.iter()) {
                assert_eq!(a.name, b.name);
                assert_eq!(a.kind, b.kind);
                assert_eq!(a.value, b.value);
            }
            TestResult::passed()
        }
        QuickCheck::new().quickcheck(inner as fn(Vec<(u8, u8)>) -> TestResult);
    }
}
