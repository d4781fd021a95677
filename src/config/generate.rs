/// Starter configuration written by `lokitee config init`.
///
/// The local host name is filled in as the static `instance` label.
pub fn generate_starter_config() -> String {
    let instance = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());

    format!(
        r#"# =============================================================================
# LOKITEE CONFIGURATION
# =============================================================================
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/lokitee/config.yml
#   3. /etc/lokitee/config.yml
#
# Any value may reference an environment variable with the $env{{...}} syntax,
# for example to keep the Loki password out of this file.

# =============================================================================
# LOKI ENDPOINT
# =============================================================================
loki:
  # Base URL; records are pushed to <url>/loki/api/v1/push
  url: http://localhost:3100
  # Optional HTTP Basic credentials
  # user: tenant
  # password: secret
  # Timeout of a single push attempt
  timeout: 3s
  # Pause between failed push attempts (pushes are retried until they succeed)
  retry_interval: 1s
  # 'retry' keeps retrying payloads rejected with HTTP 400, 'drop' discards them
  on_bad_request: retry

# =============================================================================
# LABELS
# =============================================================================
# Record fields promoted to Loki stream labels. A record's own field wins over
# the static value. Keep these low-cardinality.
labels:
  - name: instance
    value: {instance}
  - name: service

# =============================================================================
# RECORD FIELDS
# =============================================================================
fields:
  time: timestamp
  level: level
  logger: target

# =============================================================================
# PIPELINE
# =============================================================================
pipeline:
  # Records buffered between writers and the dispatcher
  buffer_size: 1000
  # Records per push
  batch_size: 100
  # Concurrent sync() callers tracked before the oldest is abandoned
  max_pending_syncs: 100
  # Pushes happen at least this often while records are buffered
  flush_interval: 10s
  sync_timeout: 10s
  # 'fail' stops shipping on a malformed record, 'drop' skips it
  on_decode_error: drop
"#
    )
}
