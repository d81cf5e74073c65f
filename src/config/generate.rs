pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# NSG HARVESTER CONFIGURATION
# =============================================================================
# This file configures one harvest job: which container of Azure diagnostic
# logs to read, where to forward the converted CEF events, and where to keep
# the checkpoints that make each run resume where the previous one stopped.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/nsg-harvester/config.yml
#   3. /etc/nsg-harvester/config.yml
#
# Any value may reference an environment variable as $env{...}, e.g. a syslog
# host kept out of the file.

# =============================================================================
# SOURCE
# =============================================================================
# kind selects the record decoder and must match the container being read:
#   nsg_flow          insights-logs-networksecuritygroupflowevent
#   gateway_access    insights-logs-applicationgatewayaccesslog
#   gateway_firewall  insights-logs-applicationgatewayfirewalllog
#
# root is a local directory mirroring the container. Object keys are the
# paths below it, e.g.
#   resourceId=/SUBSCRIPTIONS/.../y=2017/m=06/d=09/h=20/m=00/PT1H.json

source:
  kind: nsg_flow
  root: /var/lib/nsg-harvester/insights-logs-networksecuritygroupflowevent
  prefix: "resourceId="

# =============================================================================
# HARVEST
# =============================================================================
# name:           Used in logs and in the /status endpoint
# begin_time:     Objects whose hour is at or before this instant are skipped
#                 (optional, RFC 3339)
# concurrency:    Objects processed at the same time
# poll_interval:  Pause between runs when not started with --once

harvest:
  name: nsg-flow
  # begin_time: 2017-06-09T00:00:00Z
  concurrency: 4
  poll_interval: 60s

# =============================================================================
# STORAGE
# =============================================================================
# Checkpoints are kept per sink type as
# <data_dir>/nsg-harvester-status-<sink>.json

storage:
  data_dir: ~/.local/share/nsg-harvester

# =============================================================================
# SINK
# =============================================================================
# Exactly one sink per job.
#
# File sink: one JSON file of events per processed object range.
#
#   sink:
#     type: file
#     path: /var/log/nsg-harvester
#
# Syslog sink: one CEF line per event over TCP or UDP.

sink:
  type: syslog
  protocol: tcp
  host: 127.0.0.1
  port: 514

# =============================================================================
# WEB (optional)
# =============================================================================
# Serves GET /health and GET /status while the harvester is running.

# web:
#   listen: 127.0.0.1:7105
"#
    .to_string()
}
