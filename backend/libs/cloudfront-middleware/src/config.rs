/// Middleware options and their validated form
use crate::decider::{ColdStartPolicy, DEFAULT_DURATION};
use crate::error::ConfigError;
use crate::ranges::{
    RefreshPolicy, RegionFilter, DEFAULT_FETCH_TIMEOUT, DEFAULT_IP_RANGES_URL,
    DEFAULT_UPDATE_FREQUENCY,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::warn;
use url::Url;

const LEGACY_UPDATE_FREQUENCY: &str = "updatefrenquency";

/// Raw option values as supplied by the configuration loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareOptions {
    pub baseurl: Option<String>,
    pub privatekey: Option<String>,
    pub keypairid: Option<String>,
    pub duration: Option<String>,
    pub updatefrequency: Option<String>,
    /// Misspelled alias kept for older configurations
    pub updatefrenquency: Option<String>,
    pub iprangesurl: Option<String>,
    pub ipfilteredby: Option<String>,
    pub awsregion: Option<String>,
    pub fetchtimeout: Option<String>,
    pub coldstartpolicy: Option<String>,
}

impl MiddlewareOptions {
    /// Load from environment variables, e.g. `CLOUDFRONT_BASEURL` with prefix `CLOUDFRONT_`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        envy::prefixed(prefix)
            .from_env::<Self>()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Build from key/value pairs. Keys are case-insensitive; unknown keys are ignored.
    pub fn from_map<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let object: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(k, v)| {
                (
                    k.as_ref().to_lowercase(),
                    serde_json::Value::String(v.into()),
                )
            })
            .collect();

        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ConfigError::Load(e.to_string()))
    }
}

/// How request origins are filtered before choosing the edge path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpFilterMode {
    /// No filtering: every request gets a signed edge URL.
    Disabled,
    /// Any published AWS range counts as close to origin.
    AllRegions,
    /// Only ranges in the listed regions count.
    Regions(RegionFilter),
}

#[derive(Debug, Clone)]
pub struct CloudFrontConfig {
    /// Absolute URL ending in `/`
    pub base_url: String,
    pub private_key_path: PathBuf,
    pub key_pair_id: String,
    pub duration: Duration,
    pub update_frequency: Duration,
    pub ip_ranges_url: String,
    pub ip_filter: IpFilterMode,
    pub fetch_timeout: Duration,
    pub cold_start: ColdStartPolicy,
    /// Deprecated option names that were used
    pub deprecated_options: Vec<&'static str>,
}

impl CloudFrontConfig {
    pub fn from_options(options: &MiddlewareOptions) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(required(&options.baseurl, "baseurl")?)?;
        let private_key_path = PathBuf::from(required(&options.privatekey, "privatekey")?);
        let key_pair_id = required(&options.keypairid, "keypairid")?.to_string();

        let duration = optional_duration(&options.duration, "duration", DEFAULT_DURATION)?;
        if chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .is_none()
        {
            return Err(ConfigError::invalid("duration", "too large for an expiry time"));
        }

        let mut deprecated_options = Vec::new();
        if options.updatefrenquency.is_some() {
            warn!("cloudfront updatefrenquency is deprecated. Please use updatefrequency");
            deprecated_options.push(LEGACY_UPDATE_FREQUENCY);
        }
        // The legacy spelling overrides the correct one when both are set.
        let update_frequency = match non_empty(&options.updatefrenquency)
            .or(non_empty(&options.updatefrequency))
        {
            Some(raw) => positive_duration(raw, "updatefrequency")?,
            None => DEFAULT_UPDATE_FREQUENCY,
        };
        if Instant::now().checked_add(update_frequency).is_none() {
            return Err(ConfigError::invalid("updatefrequency", "too large for a refresh interval"));
        }

        let ip_ranges_url = match non_empty(&options.iprangesurl) {
            Some(url) => {
                Url::parse(url).map_err(|e| ConfigError::invalid("iprangesurl", e.to_string()))?;
                url.to_string()
            }
            None => DEFAULT_IP_RANGES_URL.to_string(),
        };

        let ip_filter = parse_ip_filter(options)?;

        let fetch_timeout =
            optional_duration(&options.fetchtimeout, "fetchtimeout", DEFAULT_FETCH_TIMEOUT)?;

        let cold_start = match non_empty(&options.coldstartpolicy) {
            Some(policy) => policy
                .parse()
                .map_err(|reason: String| ConfigError::invalid("coldstartpolicy", reason))?,
            None => ColdStartPolicy::default(),
        };

        Ok(Self {
            base_url,
            private_key_path,
            key_pair_id,
            duration,
            update_frequency,
            ip_ranges_url,
            ip_filter,
            fetch_timeout,
            cold_start,
            deprecated_options,
        })
    }

    /// Refresh policy for the configured filter, `None` when filtering is disabled.
    pub fn refresh_policy(&self) -> Option<RefreshPolicy> {
        let regions = match &self.ip_filter {
            IpFilterMode::Disabled => return None,
            IpFilterMode::AllRegions => RegionFilter::all(),
            IpFilterMode::Regions(regions) => regions.clone(),
        };

        Some(
            RefreshPolicy::new(self.ip_ranges_url.clone())
                .with_regions(regions)
                .with_interval(self.update_frequency)
                .with_fetch_timeout(self.fetch_timeout),
        )
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, option: &'static str) -> Result<&'a str, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(option))
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let mut base_url = raw.to_string();
    if !base_url.contains("://") {
        base_url = format!("https://{base_url}");
    }
    if !base_url.ends_with('/') {
        base_url.push('/');
    }

    let parsed = Url::parse(&base_url).map_err(|e| ConfigError::invalid("baseurl", e.to_string()))?;
    if !parsed.has_host() {
        return Err(ConfigError::invalid("baseurl", "missing host"));
    }

    Ok(base_url)
}

fn parse_ip_filter(options: &MiddlewareOptions) -> Result<IpFilterMode, ConfigError> {
    let mode = options
        .ipfilteredby
        .as_deref()
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_default();

    match mode.as_str() {
        "" | "none" => Ok(IpFilterMode::Disabled),
        "aws" => Ok(IpFilterMode::AllRegions),
        "awsregion" => {
            let regions = RegionFilter::parse_list(required(&options.awsregion, "awsregion")?);
            if regions.is_empty() {
                return Err(ConfigError::invalid(
                    "awsregion",
                    "must be a comma separated string of valid aws regions",
                ));
            }
            Ok(IpFilterMode::Regions(regions))
        }
        _ => Err(ConfigError::invalid(
            "ipfilteredby",
            "only allows a string with the following value: none|aws|awsregion",
        )),
    }
}

fn optional_duration(
    value: &Option<String>,
    option: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match non_empty(value) {
        Some(raw) => positive_duration(raw, option),
        None => Ok(default),
    }
}

fn positive_duration(raw: &str, option: &'static str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(raw).map_err(|reason| ConfigError::invalid(option, reason))?;
    if duration.is_zero() {
        return Err(ConfigError::invalid(option, "must be greater than zero"));
    }
    Ok(duration)
}

/// Parse a Go-style duration (`20m`, `1h30m`, `1.5h`, `250ms`). A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration {input:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };

        total += value * scale;
        rest = tail;
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options() -> MiddlewareOptions {
        MiddlewareOptions {
            baseurl: Some("d111.cloudfront.net".to_string()),
            privatekey: Some("/etc/registry/pk.pem".to_string()),
            keypairid: Some("APKAEXAMPLE".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = CloudFrontConfig::from_options(&base_options()).unwrap();

        assert_eq!(config.base_url, "https://d111.cloudfront.net/");
        assert_eq!(config.private_key_path, PathBuf::from("/etc/registry/pk.pem"));
        assert_eq!(config.key_pair_id, "APKAEXAMPLE");
        assert_eq!(config.duration, Duration::from_secs(20 * 60));
        assert_eq!(config.update_frequency, Duration::from_secs(12 * 3600));
        assert_eq!(config.ip_ranges_url, DEFAULT_IP_RANGES_URL);
        assert_eq!(config.ip_filter, IpFilterMode::Disabled);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.cold_start, ColdStartPolicy::EdgeOnly);
        assert!(config.deprecated_options.is_empty());
        assert!(config.refresh_policy().is_none());
    }

    #[test]
    fn test_base_url_normalization() {
        for (raw, expected) in [
            ("d111.cloudfront.net", "https://d111.cloudfront.net/"),
            ("http://cdn.example.com/registry", "http://cdn.example.com/registry/"),
            ("https://cdn.example.com/", "https://cdn.example.com/"),
        ] {
            let options = MiddlewareOptions {
                baseurl: Some(raw.to_string()),
                ..base_options()
            };
            let config = CloudFrontConfig::from_options(&options).unwrap();
            assert_eq!(config.base_url, expected);
        }
    }

    #[test]
    fn test_missing_required_options() {
        for (options, missing) in [
            (MiddlewareOptions { baseurl: None, ..base_options() }, "baseurl"),
            (MiddlewareOptions { privatekey: None, ..base_options() }, "privatekey"),
            (MiddlewareOptions { keypairid: Some("  ".to_string()), ..base_options() }, "keypairid"),
        ] {
            match CloudFrontConfig::from_options(&options) {
                Err(ConfigError::Missing(name)) => assert_eq!(name, missing),
                other => panic!("expected missing {}, got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn test_invalid_base_url() {
        let options = MiddlewareOptions {
            baseurl: Some("https://".to_string()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&options),
            Err(ConfigError::Invalid { option: "baseurl", .. })
        ));
    }

    #[test]
    fn test_durations() {
        let options = MiddlewareOptions {
            duration: Some("1h30m".to_string()),
            updatefrequency: Some("30m".to_string()),
            fetchtimeout: Some("5s".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&options).unwrap();

        assert_eq!(config.duration, Duration::from_secs(5400));
        assert_eq!(config.update_frequency, Duration::from_secs(1800));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_durations() {
        for (options, option) in [
            (MiddlewareOptions { duration: Some("soon".to_string()), ..base_options() }, "duration"),
            (MiddlewareOptions { updatefrequency: Some("0s".to_string()), ..base_options() }, "updatefrequency"),
            (MiddlewareOptions { fetchtimeout: Some("10x".to_string()), ..base_options() }, "fetchtimeout"),
        ] {
            match CloudFrontConfig::from_options(&options) {
                Err(ConfigError::Invalid { option: name, .. }) => assert_eq!(name, option),
                other => panic!("expected invalid {}, got {:?}", option, other),
            }
        }
    }

    #[test]
    fn test_legacy_update_frequency_is_honored() {
        let correct = MiddlewareOptions {
            updatefrequency: Some("6h".to_string()),
            ..base_options()
        };
        let legacy = MiddlewareOptions {
            updatefrenquency: Some("6h".to_string()),
            ..base_options()
        };

        let correct = CloudFrontConfig::from_options(&correct).unwrap();
        let legacy = CloudFrontConfig::from_options(&legacy).unwrap();

        assert_eq!(correct.update_frequency, legacy.update_frequency);
        assert!(correct.deprecated_options.is_empty());
        assert_eq!(legacy.deprecated_options, vec!["updatefrenquency"]);
    }

    #[test]
    fn test_legacy_update_frequency_wins_over_correct_spelling() {
        let options = MiddlewareOptions {
            updatefrequency: Some("6h".to_string()),
            updatefrenquency: Some("2h".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&options).unwrap();
        assert_eq!(config.update_frequency, Duration::from_secs(7200));
    }

    #[test]
    fn test_blank_update_frequency_behaves_the_same_under_both_spellings() {
        let correct = MiddlewareOptions {
            updatefrequency: Some("".to_string()),
            ..base_options()
        };
        let legacy = MiddlewareOptions {
            updatefrenquency: Some("  ".to_string()),
            ..base_options()
        };

        let correct = CloudFrontConfig::from_options(&correct).unwrap();
        let legacy = CloudFrontConfig::from_options(&legacy).unwrap();

        assert_eq!(correct.update_frequency, DEFAULT_UPDATE_FREQUENCY);
        assert_eq!(legacy.update_frequency, DEFAULT_UPDATE_FREQUENCY);
        assert_eq!(legacy.deprecated_options, vec!["updatefrenquency"]);

        let blank_legacy_with_correct = MiddlewareOptions {
            updatefrequency: Some("3h".to_string()),
            updatefrenquency: Some("".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&blank_legacy_with_correct).unwrap();
        assert_eq!(config.update_frequency, Duration::from_secs(3 * 3600));

        for raw in ["0s", "soon"] {
            let correct = CloudFrontConfig::from_options(&MiddlewareOptions {
                updatefrequency: Some(raw.to_string()),
                ..base_options()
            });
            let legacy = CloudFrontConfig::from_options(&MiddlewareOptions {
                updatefrenquency: Some(raw.to_string()),
                ..base_options()
            });
            assert!(matches!(correct, Err(ConfigError::Invalid { option: "updatefrequency", .. })));
            assert!(matches!(legacy, Err(ConfigError::Invalid { option: "updatefrequency", .. })));
        }
    }

    #[test]
    fn test_unrepresentable_durations_are_rejected() {
        let huge = u64::MAX.to_string();

        let duration = MiddlewareOptions {
            duration: Some(huge.clone()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&duration),
            Err(ConfigError::Invalid { option: "duration", .. })
        ));

        let update_frequency = MiddlewareOptions {
            updatefrequency: Some(huge.clone()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&update_frequency),
            Err(ConfigError::Invalid { option: "updatefrequency", .. })
        ));

        let legacy = MiddlewareOptions {
            updatefrenquency: Some(huge),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&legacy),
            Err(ConfigError::Invalid { option: "updatefrequency", .. })
        ));

        let long_lived = MiddlewareOptions {
            duration: Some("8760h".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&long_lived).unwrap();
        assert_eq!(config.duration, Duration::from_secs(365 * 24 * 3600));
    }

    #[test]
    fn test_ip_filter_modes() {
        let aws = MiddlewareOptions {
            ipfilteredby: Some(" AWS ".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&aws).unwrap();
        assert_eq!(config.ip_filter, IpFilterMode::AllRegions);
        let policy = config.refresh_policy().unwrap();
        assert!(policy.regions.is_empty());
        assert_eq!(policy.interval, DEFAULT_UPDATE_FREQUENCY);

        let region = MiddlewareOptions {
            ipfilteredby: Some("awsregion".to_string()),
            awsregion: Some("us-east-1, US-WEST-2".to_string()),
            iprangesurl: Some("http://127.0.0.1:9999/ip-ranges.json".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&region).unwrap();
        assert_eq!(
            config.ip_filter,
            IpFilterMode::Regions(RegionFilter::new(["us-east-1", "us-west-2"]))
        );
        assert_eq!(
            config.refresh_policy().unwrap().document_url,
            "http://127.0.0.1:9999/ip-ranges.json"
        );
    }

    #[test]
    fn test_ip_filter_errors() {
        let no_region = MiddlewareOptions {
            ipfilteredby: Some("awsregion".to_string()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&no_region),
            Err(ConfigError::Missing("awsregion"))
        ));

        let blank_regions = MiddlewareOptions {
            ipfilteredby: Some("awsregion".to_string()),
            awsregion: Some(" , ,".to_string()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&blank_regions),
            Err(ConfigError::Invalid { option: "awsregion", .. })
        ));

        let unknown = MiddlewareOptions {
            ipfilteredby: Some("gcp".to_string()),
            ..base_options()
        };
        assert!(matches!(
            CloudFrontConfig::from_options(&unknown),
            Err(ConfigError::Invalid { option: "ipfilteredby", .. })
        ));
    }

    #[test]
    fn test_cold_start_option() {
        let options = MiddlewareOptions {
            coldstartpolicy: Some("origin".to_string()),
            ..base_options()
        };
        let config = CloudFrontConfig::from_options(&options).unwrap();
        assert_eq!(config.cold_start, ColdStartPolicy::Origin);

        let options = MiddlewareOptions {
            coldstartpolicy: Some("maybe".to_string()),
            ..base_options()
        };
        assert!(CloudFrontConfig::from_options(&options).is_err());
    }

    #[test]
    fn test_from_map_is_case_insensitive() {
        let options = MiddlewareOptions::from_map([
            ("BaseURL", "d111.cloudfront.net"),
            ("privatekey", "/pk.pem"),
            ("KeyPairID", "APKAEXAMPLE"),
            ("updatefrenquency", "1h"),
            ("somethingelse", "ignored"),
        ])
        .unwrap();

        assert_eq!(options.baseurl.as_deref(), Some("d111.cloudfront.net"));
        assert_eq!(options.keypairid.as_deref(), Some("APKAEXAMPLE"));
        assert_eq!(options.updatefrenquency.as_deref(), Some("1h"));
        assert!(options.updatefrequency.is_none());
    }

    #[test]
    fn test_from_env_with_prefix() {
        std::env::set_var("CFMW_TEST_BASEURL", "d111.cloudfront.net");
        std::env::set_var("CFMW_TEST_KEYPAIRID", "APKAEXAMPLE");
        std::env::set_var("CFMW_TEST_IPFILTEREDBY", "aws");

        let options = MiddlewareOptions::from_env("CFMW_TEST_").unwrap();

        assert_eq!(options.baseurl.as_deref(), Some("d111.cloudfront.net"));
        assert_eq!(options.keypairid.as_deref(), Some("APKAEXAMPLE"));
        assert_eq!(options.ipfilteredby.as_deref(), Some("aws"));
        assert!(options.privatekey.is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("20m").unwrap(), Duration::from_secs(1200));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43200));
        assert_eq!(parse_duration("1h30m15s").unwrap(), Duration::from_secs(5415));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("5m3").is_err());
    }
}
