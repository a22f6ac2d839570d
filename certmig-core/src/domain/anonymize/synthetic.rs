// certmig-core/src/domain/anonymize/synthetic.rs

use crate::domain::anonymize::rules::{SyntheticArgs, SyntheticKind};
use chrono::{Duration, Utc};
use rand::Rng;

/// Every synthetic email lands under this domain so the leak scan can
/// tell generated addresses from real ones by suffix.
pub const EMAIL_DOMAIN: &str = "anon.example.org";
pub const EMAIL_SUFFIX: &str = ".example.org";

const FIRST_NAMES: &[&str] = &[
    "Avery", "Blake", "Carmen", "Dana", "Elliot", "Frankie", "Gale", "Harper", "Indira", "Jules",
    "Kai", "Lennon", "Marlow", "Noor", "Oakley", "Peyton", "Quinn", "Reese", "Sasha", "Tatum",
    "Uma", "Vesper", "Winter", "Zephyr",
];

const LAST_NAMES: &[&str] = &[
    "Ashford", "Bellweather", "Crane", "Dovetail", "Eastwood", "Fairbank", "Glenhaven",
    "Hollis", "Ironwood", "Juniper", "Kestrel", "Larkspur", "Meadows", "Northgate", "Oakhurst",
    "Pembrook", "Quarry", "Rosewood", "Stonebridge", "Thistle", "Underhill", "Vale", "Wexford",
    "Yarrow",
];

const CITIES: &[&str] = &[
    "Alderton", "Briarcliff", "Cedar Falls", "Duskfield", "Elmsworth", "Fernvale", "Graniteport",
    "Hazelmere", "Ivorydale", "Juniper Springs", "Kilnbrook", "Lakemont", "Mapleton",
    "Nettlebay", "Oakridge", "Pinehollow",
];

const STREET_NAMES: &[&str] = &[
    "Alder", "Birch", "Cypress", "Dogwood", "Elm", "Fir", "Hawthorn", "Juniper", "Laurel",
    "Magnolia", "Poplar", "Willow",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Ln", "Dr", "Ct"];

const URL_WORDS: &[&str] = &[
    "atlas", "beacon", "cobalt", "delta", "ember", "flint", "garnet", "harbor", "indigo", "jasper",
];

const DEFAULT_MIN_AGE: u32 = 5;
const DEFAULT_MAX_AGE: u32 = 85;

/// Generates replacement values. Stateless: deterministic re-use of a
/// value for a given original comes from the consistency map, not from
/// the generator.
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn generate(kind: SyntheticKind, args: &SyntheticArgs) -> String {
        let mut rng = rand::thread_rng();

        match kind {
            SyntheticKind::Email => {
                let first = pick(&mut rng, FIRST_NAMES).to_lowercase();
                let last = pick(&mut rng, LAST_NAMES).to_lowercase();
                format!(
                    "{}.{}{}@{}",
                    first,
                    last,
                    rng.gen_range(10..10_000),
                    EMAIL_DOMAIN
                )
            }
            SyntheticKind::FirstName => pick(&mut rng, FIRST_NAMES).to_string(),
            SyntheticKind::LastName => pick(&mut rng, LAST_NAMES).to_string(),
            SyntheticKind::Name => format!(
                "{} {}",
                pick(&mut rng, FIRST_NAMES),
                pick(&mut rng, LAST_NAMES)
            ),
            SyntheticKind::PhoneNumber => {
                // 555-01xx block is reserved for fiction
                format!("+1-555-01{:02}", rng.gen_range(0..100))
            }
            SyntheticKind::StreetAddress => format!(
                "{} {} {}",
                rng.gen_range(1..9999),
                pick(&mut rng, STREET_NAMES),
                pick(&mut rng, STREET_SUFFIXES)
            ),
            SyntheticKind::City => pick(&mut rng, CITIES).to_string(),
            SyntheticKind::Zipcode => format!("{:05}", rng.gen_range(0..100_000)),
            SyntheticKind::DateOfBirth => {
                let min_age = args.minimum_age.unwrap_or(DEFAULT_MIN_AGE);
                let max_age = args.maximum_age.unwrap_or(DEFAULT_MAX_AGE).max(min_age);
                let years = rng.gen_range(min_age..=max_age) as i64;
                let jitter = rng.gen_range(0..365) as i64;
                let today = Utc::now().date_naive();
                let dob = today - Duration::days(years * 365 + jitter);
                dob.to_string()
            }
            SyntheticKind::UserName => {
                let first = pick(&mut rng, FIRST_NAMES).to_lowercase();
                let last = pick(&mut rng, LAST_NAMES).to_lowercase();
                format!("{}.{}{}", first, last, rng.gen_range(1..1000))
            }
            SyntheticKind::Ipv4 => format!(
                "10.{}.{}.{}",
                rng.gen_range(0..256),
                rng.gen_range(0..256),
                rng.gen_range(1..255)
            ),
            SyntheticKind::Url => format!(
                "https://{}{}.{}/{}",
                pick(&mut rng, URL_WORDS),
                rng.gen_range(1..100),
                EMAIL_DOMAIN,
                pick(&mut rng, URL_WORDS)
            ),
        }
    }
}

fn pick<'a, R: Rng>(rng: &mut R, list: &'a [&'a str]) -> &'a str {
    list[rng.gen_range(0..list.len())]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_email_carries_synthetic_suffix() {
        for _ in 0..20 {
            let email = SyntheticProvider::generate(SyntheticKind::Email, &SyntheticArgs::default());
            assert!(email.contains('@'));
            assert!(email.ends_with(EMAIL_SUFFIX), "unexpected email: {}", email);
        }
    }

    #[test]
    fn test_names_are_not_suspiciously_short() {
        for _ in 0..20 {
            let name =
                SyntheticProvider::generate(SyntheticKind::FirstName, &SyntheticArgs::default());
            assert!(name.len() >= 3);
        }
    }

    #[test]
    fn test_date_of_birth_respects_age_window() {
        let args = SyntheticArgs {
            minimum_age: Some(18),
            maximum_age: Some(22),
        };
        let today = Utc::now().date_naive();
        for _ in 0..20 {
            let dob = SyntheticProvider::generate(SyntheticKind::DateOfBirth, &args);
            let date = chrono::NaiveDate::parse_from_str(&dob, "%Y-%m-%d").unwrap();
            let age_days = (today - date).num_days();
            assert!(age_days >= 18 * 365, "too young: {}", dob);
            assert!(age_days <= 23 * 365 + 365, "too old: {}", dob);
        }
    }

    #[test]
    fn test_phone_uses_fictional_block() {
        let phone =
            SyntheticProvider::generate(SyntheticKind::PhoneNumber, &SyntheticArgs::default());
        assert!(phone.starts_with("+1-555-01"));
    }
}
