use crate::constants::X_AMZ_TARGET;
use http::HeaderMap;

/// Maps host-name service codes to their real signing names.
///
/// Reference data: ported verbatim, do not re-derive.
const HOST_SERVICES: [(&str, &str); 10] = [
    ("appstream2", "appstream"),
    ("cloudhsmv2", "cloudhsm"),
    ("email", "ses"),
    ("marketplace", "aws-marketplace"),
    ("mobile", "AWSMobileHubService"),
    ("pinpoint", "mobiletargeting"),
    ("queue", "sqs"),
    ("git-codecommit", "codecommit"),
    ("mturk-requester-sandbox", "mturk-requester"),
    ("personalize-runtime", "personalize"),
];

fn alias(service: &str) -> &str {
    HOST_SERVICES
        .iter()
        .find(|(from, _)| *from == service)
        .map(|(_, to)| *to)
        .unwrap_or(service)
}

/// Infer `(service, region)` from a host name, the request path and headers.
///
/// Used only when the caller does not supply service and region explicitly.
/// This is inherently heuristic: the rules below are ported rule-for-rule and
/// their ordering matters for ambiguous host names. Unresolvable inputs yield
/// `("", None)`; the signer falls back to `us-east-1` and an empty service in
/// that case, leaving the caller free to override.
pub fn guess_service_region(
    hostname: &str,
    path: &str,
    headers: &HeaderMap,
) -> (String, Option<String>) {
    if hostname.ends_with(".r2.cloudflarestorage.com") {
        return ("s3".to_string(), Some("auto".to_string()));
    }

    if hostname.ends_with(".backblazeb2.com") {
        // `[bucket.]s3.<region>.backblazeb2.com`, anything else is unknown.
        let labels: Vec<&str> = hostname
            .strip_suffix(".backblazeb2.com")
            .unwrap_or_default()
            .split('.')
            .collect();
        return match labels.as_slice() {
            ["s3", region] | [_, "s3", region] if !region.is_empty() => {
                ("s3".to_string(), Some(region.to_string()))
            }
            _ => (String::new(), None),
        };
    }

    let (mut service, mut region) = match_amazonaws(&hostname.replacen("dualstack.", "", 1));
    if service.is_empty() {
        return (String::new(), None);
    }

    if region.as_deref() == Some("us-gov") {
        region = Some("us-gov-west-1".to_string());
    } else if region.as_deref() == Some("s3") || region.as_deref() == Some("s3-accelerate") {
        region = Some("us-east-1".to_string());
        service = "s3".to_string();
    } else if service == "iot" {
        service = if hostname.starts_with("iot.") {
            "execute-api".to_string()
        } else if hostname.starts_with("data.jobs.iot.") {
            "iot-jobs-data".to_string()
        } else if path == "/mqtt" {
            "iotdevicegateway".to_string()
        } else {
            "iotdata".to_string()
        };
    } else if service == "autoscaling" {
        let target = headers
            .get(X_AMZ_TARGET)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let target_prefix = target.split('.').next().unwrap_or("");
        if target_prefix == "AnyScaleFrontendService" {
            service = "application-autoscaling".to_string();
        } else if target_prefix == "AnyScaleScalingPlannerFrontendService" {
            service = "autoscaling-plans".to_string();
        }
    } else if region.is_none() && service.starts_with("s3-") {
        let rest = &service[3..];
        let rest = rest
            .strip_prefix("fips-")
            .or_else(|| rest.strip_prefix("external-1"))
            .unwrap_or(rest);
        region = Some(rest.to_string());
        service = "s3".to_string();
    } else if service.ends_with("-fips") {
        service = service[..service.len() - 5].to_string();
    } else if let Some(r) = &region {
        // Some hosts carry `<region>.<service>` reversed; a numeric suffix on
        // the service side but not the region side is the tell.
        if has_numeric_suffix(&service) && !has_numeric_suffix(r) {
            let r = r.clone();
            region = Some(std::mem::replace(&mut service, r));
        }
    }

    (alias(&service).to_string(), region)
}

/// Match `<service>.<region?>.amazonaws.com[.cn]`, taking the last one or two
/// labels before the suffix.
fn match_amazonaws(hostname: &str) -> (String, Option<String>) {
    let stripped = hostname
        .strip_suffix(".amazonaws.com.cn")
        .or_else(|| hostname.strip_suffix(".amazonaws.com"));
    let Some(prefix) = stripped else {
        return (String::new(), None);
    };

    let labels: Vec<&str> = prefix.split('.').collect();
    match labels.as_slice() {
        [] => (String::new(), None),
        [service] => (service.to_string(), None),
        [.., service, region] => (service.to_string(), Some(region.to_string())),
    }
}

/// True when the string ends with `-<digit>`, e.g. `us-east-1`.
fn has_numeric_suffix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2
        && bytes[bytes.len() - 1].is_ascii_digit()
        && bytes[bytes.len() - 2] == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn guess(hostname: &str) -> (String, Option<String>) {
        guess_service_region(hostname, "/", &HeaderMap::new())
    }

    #[test]
    fn test_generic_service_region() {
        assert_eq!(
            guess("s3.eu-west-1.amazonaws.com"),
            ("s3".to_string(), Some("eu-west-1".to_string()))
        );
        assert_eq!(
            guess("dynamodb.us-west-2.amazonaws.com"),
            ("dynamodb".to_string(), Some("us-west-2".to_string()))
        );
        assert_eq!(
            guess("sns.cn-north-1.amazonaws.com.cn"),
            ("sns".to_string(), Some("cn-north-1".to_string()))
        );
    }

    #[test]
    fn test_virtual_host_uses_last_two_labels() {
        assert_eq!(
            guess("bucket.s3.us-east-2.amazonaws.com"),
            ("s3".to_string(), Some("us-east-2".to_string()))
        );
    }

    #[test]
    fn test_dualstack_prefix_stripped() {
        assert_eq!(
            guess("s3.dualstack.us-east-1.amazonaws.com"),
            ("s3".to_string(), Some("us-east-1".to_string()))
        );
    }

    #[test]
    fn test_r2() {
        assert_eq!(
            guess("abc123.r2.cloudflarestorage.com"),
            ("s3".to_string(), Some("auto".to_string()))
        );
    }

    #[test]
    fn test_backblaze() {
        assert_eq!(
            guess("s3.us-west-004.backblazeb2.com"),
            ("s3".to_string(), Some("us-west-004".to_string()))
        );
        assert_eq!(
            guess("bucket.s3.eu-central-003.backblazeb2.com"),
            ("s3".to_string(), Some("eu-central-003".to_string()))
        );
        assert_eq!(guess("f004.backblazeb2.com"), (String::new(), None));
    }

    #[test]
    fn test_unresolvable() {
        assert_eq!(guess("example.com"), (String::new(), None));
        assert_eq!(guess("localhost"), (String::new(), None));
    }

    #[test]
    fn test_us_gov_normalized() {
        assert_eq!(
            guess("dynamodb.us-gov.amazonaws.com"),
            ("dynamodb".to_string(), Some("us-gov-west-1".to_string()))
        );
    }

    #[test]
    fn test_s3_region_slot() {
        assert_eq!(
            guess("bucket.s3.amazonaws.com"),
            ("s3".to_string(), Some("us-east-1".to_string()))
        );
        assert_eq!(
            guess("bucket.s3-accelerate.amazonaws.com"),
            ("s3".to_string(), Some("us-east-1".to_string()))
        );
    }

    #[test]
    fn test_s3_region_suffix() {
        assert_eq!(
            guess("s3-us-west-2.amazonaws.com"),
            ("s3".to_string(), Some("us-west-2".to_string()))
        );
        assert_eq!(
            guess("s3-fips-us-gov-west-1.amazonaws.com"),
            ("s3".to_string(), Some("us-gov-west-1".to_string()))
        );
        assert_eq!(
            guess("s3-external-1.amazonaws.com"),
            ("s3".to_string(), Some("".to_string()))
        );
    }

    #[test]
    fn test_iot_disambiguation() {
        assert_eq!(
            guess("iot.us-east-1.amazonaws.com"),
            ("execute-api".to_string(), Some("us-east-1".to_string()))
        );
        assert_eq!(
            guess("data.jobs.iot.us-east-1.amazonaws.com"),
            ("iot-jobs-data".to_string(), Some("us-east-1".to_string()))
        );
        assert_eq!(
            guess_service_region("abc.iot.us-east-1.amazonaws.com", "/mqtt", &HeaderMap::new()),
            ("iotdevicegateway".to_string(), Some("us-east-1".to_string()))
        );
        assert_eq!(
            guess("abc.iot.us-east-1.amazonaws.com"),
            ("iotdata".to_string(), Some("us-east-1".to_string()))
        );
    }

    #[test]
    fn test_autoscaling_target_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-amz-target",
            HeaderValue::from_static("AnyScaleFrontendService.Foo"),
        );
        assert_eq!(
            guess_service_region("autoscaling.us-east-1.amazonaws.com", "/", &headers),
            (
                "application-autoscaling".to_string(),
                Some("us-east-1".to_string())
            )
        );

        headers.insert(
            "x-amz-target",
            HeaderValue::from_static("AnyScaleScalingPlannerFrontendService.Foo"),
        );
        assert_eq!(
            guess_service_region("autoscaling.us-east-1.amazonaws.com", "/", &headers),
            ("autoscaling-plans".to_string(), Some("us-east-1".to_string()))
        );

        assert_eq!(
            guess("autoscaling.us-east-1.amazonaws.com"),
            ("autoscaling".to_string(), Some("us-east-1".to_string()))
        );
    }

    #[test]
    fn test_fips_suffix_stripped() {
        assert_eq!(
            guess("kms-fips.us-west-2.amazonaws.com"),
            ("kms".to_string(), Some("us-west-2".to_string()))
        );
    }

    #[test]
    fn test_reversed_ordering_swapped() {
        assert_eq!(
            guess("us-east-1.ec2.amazonaws.com"),
            ("ec2".to_string(), Some("us-east-1".to_string()))
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            guess("email.us-east-1.amazonaws.com"),
            ("ses".to_string(), Some("us-east-1".to_string()))
        );
        assert_eq!(
            guess("queue.amazonaws.com"),
            ("sqs".to_string(), None)
        );
        assert_eq!(
            guess("mobile.us-east-1.amazonaws.com"),
            ("AWSMobileHubService".to_string(), Some("us-east-1".to_string()))
        );
    }
}
