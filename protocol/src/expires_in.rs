use {
    anyhow::{Context as _, Error},
    chrono::TimeDelta,
    serde::{de, Deserialize, Deserializer, Serialize, Serializer},
    std::{borrow::Cow, fmt, str::FromStr},
};

const MILLIS_PER_SECOND: f64 = 1000.0;
const MILLIS_PER_MINUTE: f64 = 60.0 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: f64 = 60.0 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: f64 = 24.0 * MILLIS_PER_HOUR;

/// Lifetime of an issued token, written the way it appears in the environment.
///
/// Two notations are accepted:
///
/// - a single number with an optional unit, as in `15m`, `2.5h`, `7 days` or
///   `1y`. A bare number such as `60000` counts milliseconds.
/// - a sequence of whole-number terms, as in `1h 30m`.
///
/// A leading `-` produces a negative lifetime, so the token is already
/// expired when it is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpiresIn(TimeDelta);

impl ExpiresIn {
    #[must_use]
    #[inline]
    pub fn from_seconds(seconds: i64) -> Self {
        Self(TimeDelta::seconds(seconds))
    }

    #[must_use]
    #[inline]
    pub fn get(&self) -> TimeDelta {
        self.0
    }

    #[must_use]
    #[inline]
    pub fn as_seconds(&self) -> i64 {
        self.0.num_seconds()
    }
}

fn unit_millis(unit: &str) -> Option<f64> {
    let millis = match unit.to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => MILLIS_PER_SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MILLIS_PER_MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => MILLIS_PER_HOUR,
        "d" | "day" | "days" => MILLIS_PER_DAY,
        "w" | "week" | "weeks" => 7.0 * MILLIS_PER_DAY,
        "y" | "yr" | "yrs" | "year" | "years" => 365.25 * MILLIS_PER_DAY,
        _ => return None,
    };
    Some(millis)
}

/// `2.5h`, `90 minutes`, `60000`.
fn parse_single_term(s: &str) -> Option<TimeDelta> {
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() || number == "." {
        return None;
    }
    let millis = number.parse::<f64>().ok()? * unit_millis(unit.trim_start())?;
    if !millis.is_finite() {
        return None;
    }
    #[expect(
        clippy::as_conversions,
        clippy::cast_possible_truncation,
        reason = "float to int casts saturate and the range is checked below"
    )]
    let millis = millis.floor() as i64;
    TimeDelta::try_milliseconds(millis)
}

impl FromStr for ExpiresIn {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, magnitude) = match s.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s),
        };
        let delta = match parse_single_term(magnitude) {
            Some(delta) => delta,
            None => {
                let duration = humantime::parse_duration(magnitude)
                    .with_context(|| format!("invalid token lifetime `{s}`"))?;
                TimeDelta::from_std(duration)
                    .with_context(|| format!("token lifetime `{s}` is out of range"))?
            }
        };
        Ok(Self(if negative { -delta } else { delta }))
    }
}

impl fmt::Display for ExpiresIn {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.abs().to_std().unwrap_or_default();
        if self.0 < TimeDelta::zero() {
            write!(f, "-")?;
        }
        write!(f, "{}", humantime::format_duration(magnitude))
    }
}

impl<'de> Deserialize<'de> for ExpiresIn {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for ExpiresIn {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}
