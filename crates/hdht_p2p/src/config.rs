//! Network configuration and tuning params.

use crate::types::{HdhtP2pError, HdhtP2pResult};
use crate::HdhtTimeout;
use std::collections::HashMap;
use std::time::Duration;

macro_rules! mk_tune {
    ($($(#[doc = $doc:expr])* $i:ident: $t:ty = $d:expr,)*) => {
        /// Network tuning parameters.
        /// Every value is serialized as a string so configs can be written in
        /// YAML by hand; unknown or unparsable keys are logged and skipped.
        #[non_exhaustive]
        #[derive(Clone, Debug, PartialEq)]
        pub struct HdhtTuningParams {
            $(
                $(#[doc = $doc])*
                pub $i: $t,
            )*
        }

        impl Default for HdhtTuningParams {
            fn default() -> Self {
                Self {
                    $(
                        $i: $d,
                    )*
                }
            }
        }

        impl serde::Serialize for HdhtTuningParams {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use serde::ser::SerializeMap;
                let mut m = serializer.serialize_map(None)?;
                $(
                    m.serialize_entry(
                        stringify!($i),
                        &format!("{}", &self.$i),
                    )?;
                )*
                m.end()
            }
        }

        impl<'de> serde::Deserialize<'de> for HdhtTuningParams {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let result = <HashMap<String, String>>::deserialize(deserializer)?;
                let mut out = HdhtTuningParams::default();
                for (k, v) in result.into_iter() {
                    match k.as_str() {
                        $(
                            stringify!($i) => match v.parse::<$t>() {
                                Ok(v) => out.$i = v,
                                Err(e) => tracing::warn!("failed to parse {}: {}", k, e),
                            },
                        )*
                        _ => tracing::warn!("INVALID TUNING PARAM: '{}'", k),
                    }
                }
                Ok(out)
            }
        }
    };
}

mk_tune! {
    /// Maximum peers per routing bucket (Kademlia k). [Default: 20]
    bucket_size: usize = 20,

    /// Concurrent queries per iterative lookup (Kademlia alpha). [Default: 3]
    lookup_alpha: usize = 3,

    /// Delay between periodic gossip rounds. [Default: 2s]
    gossip_interval_ms: u64 = 2000,

    /// Extra delay per put in a served batch before a reciprocal
    /// gossip is started. [Default: 1ms]
    gossip_reciprocal_delay_per_put_ms: u64 = 1,

    /// Minimum delay before a reciprocal gossip. [Default: 10ms]
    gossip_reciprocal_min_delay_ms: u64 = 10,

    /// How many of the nearest peers are gossip partners.
    /// 0 means every known peer. [Default: 0]
    redundancy_factor: usize = 0,

    /// Delay between retries of failed inbound changes. [Default: 1s]
    retry_interval_ms: u64 = 1000,

    /// Attempts made on a failed inbound change before it is
    /// dropped. [Default: 10]
    retry_max_attempts: u32 = 10,

    /// Capacity of the outbound change queue. [Default: 64]
    change_queue_size: usize = 64,

    /// Capacity of the gossip request and replay queues. [Default: 16]
    gossip_queue_size: usize = 16,

    /// Timeout on a single remote request. [Default: 30s]
    request_timeout_ms: u64 = 1000 * 30,

    /// Timeout on dialing a peer. [Default: 5s]
    dial_timeout_ms: u64 = 1000 * 5,
}

impl HdhtTuningParams {
    /// Gossip period as a duration.
    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    /// Retry period as a duration.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Delay before answering a gossip that served `put_count` puts with a
    /// reciprocal gossip.
    pub fn reciprocal_delay(&self, put_count: usize) -> Duration {
        let per_put = self
            .gossip_reciprocal_delay_per_put_ms
            .saturating_mul(put_count as u64);
        Duration::from_millis(per_put.max(self.gossip_reciprocal_min_delay_ms))
    }

    /// A fresh timeout for one remote request.
    pub fn request_timeout(&self) -> HdhtTimeout {
        HdhtTimeout::after_millis("request", self.request_timeout_ms)
    }

    /// A fresh timeout for one dial.
    pub fn dial_timeout(&self) -> HdhtTimeout {
        HdhtTimeout::after_millis("dial", self.dial_timeout_ms)
    }
}

/// Configuration for one [`crate::Dht`] node.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HdhtConfig {
    /// Tuning params.
    pub tuning_params: HdhtTuningParams,
}

impl HdhtConfig {
    /// Parse a YAML config.
    pub fn from_yaml(yaml: &str) -> HdhtP2pResult<Self> {
        serde_yaml::from_str(yaml).map_err(HdhtP2pError::other)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> HdhtP2pResult<String> {
        serde_yaml::to_string(self).map_err(HdhtP2pError::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tuning_params_are_strings() {
        let yaml = HdhtConfig::default().to_yaml().unwrap();
        let raw: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            Some("20"),
            raw["tuning_params"]["bucket_size"].as_str(),
            "{}",
            yaml
        );
        assert_eq!(HdhtConfig::default(), HdhtConfig::from_yaml(&yaml).unwrap());
    }

    #[test]
    fn partial_and_unknown_params() {
        let config = HdhtConfig::from_yaml(
            r#"
tuning_params:
  lookup_alpha: "5"
  redundancy_factor: "1"
  not_a_param: "x"
  bucket_size: "lots"
"#,
        )
        .unwrap();
        let tp = config.tuning_params;
        assert_eq!(5, tp.lookup_alpha);
        assert_eq!(1, tp.redundancy_factor);
        assert_eq!(20, tp.bucket_size);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(HdhtConfig::default(), HdhtConfig::from_yaml("{}").unwrap());
    }

    #[test]
    fn reciprocal_delay_has_a_floor() {
        let tp = HdhtTuningParams::default();
        assert_eq!(Duration::from_millis(10), tp.reciprocal_delay(0));
        assert_eq!(Duration::from_millis(10), tp.reciprocal_delay(3));
        assert_eq!(Duration::from_millis(500), tp.reciprocal_delay(500));
    }
}
