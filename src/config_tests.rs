use super::*;
use serial_test::serial;
use tempfile::tempdir;

#[test]
fn test_default_config_validates() {
    let config = DurableConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.checkpoint_policy, CheckpointPolicy::AfterEachAgent);
    assert_eq!(config.retry, RetryPolicy::default());
}

#[test]
fn test_yaml_parsing() {
    let yaml = r#"
store_dir: /var/lib/durable
checkpoint_policy: after_root_call
retry:
  max_retries: 5
  initial_delay_ms: 100
log_filter: durable_agent=debug
"#;
    let config: DurableConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.store_dir, Some(PathBuf::from("/var/lib/durable")));
    assert_eq!(config.checkpoint_policy, CheckpointPolicy::AfterRootCall);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.initial_delay_ms, 100);
    assert_eq!(config.retry.backoff_multiplier, 2.0);
    assert_eq!(config.log_filter.as_deref(), Some("durable_agent=debug"));
}

#[test]
fn test_unknown_field_fails_to_parse() {
    let yaml = "store_directory: /tmp\n";
    assert!(serde_yaml::from_str::<DurableConfig>(yaml).is_err());
}

#[test]
fn test_validation_rejects_bad_retry_policy() {
    let config = DurableConfig {
        retry: RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        },
        ..DurableConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("backoff_multiplier"));
}

#[test]
fn test_validation_rejects_bad_log_filter() {
    let config = DurableConfig {
        log_filter: Some("durable_agent=loudest".to_string()),
        ..DurableConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_load_reports_path_on_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "checkpoint_policy: sometimes\n").unwrap();

    let err = DurableConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
#[serial]
fn test_load_or_default_reads_home_config() {
    let dir = tempdir().unwrap();
    std::env::set_var(durable_paths::HOME_ENV_VAR, dir.path());
    std::fs::write(
        dir.path().join("config.yaml"),
        "checkpoint_policy: none\n",
    )
    .unwrap();

    let config = DurableConfig::load_or_default(None);
    let store_dir = durable_paths::resolve_store_dir(None);
    std::env::remove_var(durable_paths::HOME_ENV_VAR);

    assert_eq!(config.unwrap().checkpoint_policy, CheckpointPolicy::None);
    assert_eq!(store_dir.unwrap(), dir.path().join("tasks"));
}

#[test]
#[serial]
fn test_load_or_default_without_file() {
    let dir = tempdir().unwrap();
    std::env::set_var(durable_paths::HOME_ENV_VAR, dir.path());

    let config = DurableConfig::load_or_default(None);
    std::env::remove_var(durable_paths::HOME_ENV_VAR);

    assert_eq!(config.unwrap(), DurableConfig::default());
}

#[test]
fn test_workflow_definition_parsing() {
    let yaml = r#"
agents:
  - name: researcher
    agent_id: r1
    output_key: research
    input_keys: [topic]
  - name: writer
    agent_id: w1
    output_key: story
"#;
    let dir = tempdir().unwrap();
    let path = dir.path().join("workflow.yaml");
    std::fs::write(&path, yaml).unwrap();

    let definition = WorkflowDefinition::load(&path).unwrap();
    let topology = definition.topology();
    assert_eq!(topology.len(), 2);
    assert_eq!(topology.output_key(Some("w1"), "writer"), Some("story"));
    assert_eq!(definition.agents[0].input_keys, vec!["topic".to_string()]);
    assert!(definition.agents[1].input_keys.is_empty());
}

#[test]
fn test_workflow_definition_validation() {
    let empty = WorkflowDefinition { agents: Vec::new() };
    assert!(empty.validate().is_err());

    let duplicate = WorkflowDefinition {
        agents: vec![
            AgentInstance::new("a", "same", "x"),
            AgentInstance::new("b", "same", "y"),
        ],
    };
    let err = duplicate.validate().unwrap_err();
    assert!(err.to_string().contains("Duplicate agent_id"));

    let no_output = WorkflowDefinition {
        agents: vec![AgentInstance::new("a", "a1", " ")],
    };
    assert!(no_output.validate().is_err());
}
