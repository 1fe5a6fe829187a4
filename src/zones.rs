//! Zone comparison.
//!
//! Zones are often written with the project code glued on the front
//! (`P5073 - Parking-Side-A`), sometimes without (`Parking-Side-A`); both
//! denote the same place.

/// Values that mean "this row has no zone".
pub fn is_no_zone(zone: &str) -> bool {
    let z = zone.trim();
    z.is_empty() || z == "0" || z.eq_ignore_ascii_case("Enabling Division")
}

/// Normalize a zone cell, mapping the "no zone" placeholders to `None`.
pub fn normalize_zone(zone: Option<&str>) -> Option<String> {
    zone.map(str::trim)
        .filter(|z| !is_no_zone(z))
        .map(str::to_string)
}

/// Strip a `"{code} - "`, `"{code} "` or `"{code}-"` decoration, trying the
/// separators in that order. Returns `None` when none applies.
fn strip_code_prefix<'a>(zone: &'a str, code: &str) -> Option<&'a str> {
    if code.is_empty() {
        return None;
    }
    [" - ", " ", "-"].iter().find_map(|sep| {
        let prefix = format!("{}{}", code, sep);
        zone.get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(&prefix))
            .map(|_| zone[prefix.len()..].trim())
    })
}

/// Local zone name: the full-code decoration removed if present, else the
/// bare-code decoration, else the zone itself.
fn local_name<'a>(zone: &'a str, full_code: &str, code: &str) -> &'a str {
    strip_code_prefix(zone, full_code)
        .or_else(|| strip_code_prefix(zone, code))
        .unwrap_or(zone)
}

/// Whether two zone strings denote the same zone of a project.
pub fn zones_match(a: &str, b: &str, full_code: &str, code: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    if a.eq_ignore_ascii_case(b) {
        return true;
    }

    let full_code = full_code.trim();
    let by_full = |z: &'_ str| -> String {
        strip_code_prefix(z, full_code).unwrap_or(z).to_string()
    };
    if !full_code.is_empty() && by_full(a).eq_ignore_ascii_case(&by_full(b)) {
        return true;
    }

    let code = code.trim();
    if code.is_empty() {
        return false;
    }
    local_name(a, full_code, code).eq_ignore_ascii_case(local_name(b, full_code, code))
}

/// Zone rule between a KPI and an activity: both zoneless, or both zoned
/// with matching zones.
pub fn zone_compatible(a: Option<&str>, b: Option<&str>, full_code: &str, code: &str) -> bool {
    let a = a.filter(|z| !is_no_zone(z));
    let b = b.filter(|z| !is_no_zone(z));
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => zones_match(a, b, full_code, code),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_prefixed_zone_matches_local_name() {
        assert!(zones_match("P5073 - Parking-Side-A", "Parking-Side-A", "P5073", "P5073"));
        assert!(zones_match("p5073-Parking-Side-A", "parking-side-a", "P5073", "P5073"));
        assert!(zones_match("P5073 Parking-Side-A", "P5073 - Parking-Side-A", "P5073", "P5073"));
    }

    #[test]
    fn bare_code_prefix_is_used_when_full_code_does_not_strip() {
        assert!(zones_match("P5066 - Block 4", "Block 4", "P5066-I1", "P5066"));
        assert!(zones_match("P5066-I1 - Block 4", "P5066 - Block 4", "P5066-I1", "P5066"));
    }

    #[test]
    fn different_zones_do_not_match() {
        assert!(!zones_match("P5073 - Zone A", "Zone B", "P5073", "P5073"));
        assert!(!zones_match("Zone A", "Zone AB", "P5073", "P5073"));
        assert!(!zones_match("X - Zone A", "Zone A", "", ""));
    }

    #[test]
    fn matching_is_symmetric() {
        let zones = [
            "P5073 - Parking-Side-A",
            "Parking-Side-A",
            "p5073 parking-side-a",
            "P5073-I1 - Parking-Side-A",
            "P5073-Parking-Side-B",
            "Zone 1",
            "",
            "P5073",
        ];
        for (full, code) in [("P5073", "P5073"), ("P5073-I1", "P5073"), ("", "")] {
            for a in zones {
                for b in zones {
                    assert_eq!(
                        zones_match(a, b, full, code),
                        zones_match(b, a, full, code),
                        "{a:?} vs {b:?} under {full}/{code}"
                    );
                }
            }
        }
    }

    #[test]
    fn placeholder_zones_mean_no_zone() {
        assert!(is_no_zone(""));
        assert!(is_no_zone(" 0 "));
        assert!(is_no_zone("enabling division"));
        assert!(!is_no_zone("Zone 0"));
        assert_eq!(normalize_zone(Some("Enabling Division")), None);
        assert_eq!(normalize_zone(Some(" Zone 2 ")), Some("Zone 2".to_string()));
    }

    #[test]
    fn zoned_and_zoneless_rows_never_pair() {
        assert!(zone_compatible(None, None, "P1", "P1"));
        assert!(zone_compatible(Some("0"), None, "P1", "P1"));
        assert!(!zone_compatible(Some("Zone A"), None, "P1", "P1"));
        assert!(!zone_compatible(None, Some("Zone A"), "P1", "P1"));
        assert!(zone_compatible(Some("P1 - Zone A"), Some("zone a"), "P1", "P1"));
    }
}
