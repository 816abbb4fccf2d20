/// Metric type suffixes understood by StatsD-family servers.
#[derive(Clone, Copy)]
pub(crate) enum MetricType {
    Count,
    Timing,
    Gauge,
    Set,
}

impl MetricType {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            MetricType::Count => b"|c",
            MetricType::Timing => b"|ms",
            MetricType::Gauge => b"|g",
            MetricType::Set => b"|s",
        }
    }
}

/// A metric value in its pre-formatted form.
#[derive(Clone, Copy)]
pub(crate) enum MetricValue<'a> {
    Integer(i64),
    FloatingPoint(f64),

    /// Passed through to the wire verbatim. Used for set elements, which have
    /// no numeric interpretation on the client side.
    Raw(&'a str),
}

/// Formats one complete metric line: `<namespace><key>:<value>|<type>[@<rate>]`.
///
/// The namespace must be empty or dot-terminated. A sampling rate of 1 is the
/// implied default on the wire, so the caller passes `None` for it and the
/// `@<rate>` suffix is only written for rates that were actually applied.
pub(crate) fn format_metric(
    namespace: &str,
    key: &str,
    value: MetricValue<'_>,
    metric_type: MetricType,
    sample_rate: Option<f64>,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(namespace.len() + key.len() + 16);

    payload.extend_from_slice(namespace.as_bytes());
    payload.extend_from_slice(key.as_bytes());
    payload.push(b':');

    match value {
        MetricValue::Integer(v) => {
            let mut int_writer = itoa::Buffer::new();
            payload.extend_from_slice(int_writer.format(v).as_bytes());
        }
        MetricValue::FloatingPoint(v) => {
            let mut float_writer = ryu::Buffer::new();
            payload.extend_from_slice(float_writer.format(v).as_bytes());
        }
        MetricValue::Raw(v) => payload.extend_from_slice(v.as_bytes()),
    }

    payload.extend_from_slice(metric_type.as_bytes());

    if let Some(rate) = sample_rate {
        let mut float_writer = ryu::Buffer::new();
        payload.push(b'@');
        payload.extend_from_slice(float_writer.format(rate).as_bytes());
    }

    payload
}
