use nexus_core::PollState;

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// One-line progress text for a polling state.
pub fn describe_poll_state(state: &PollState) -> String {
    match state {
        PollState::Pending => "waiting to start".to_string(),
        PollState::Checking {
            attempt,
            last_message,
        } => match last_message {
            Some(message) => format!("check #{}: {}", attempt, message),
            None => format!("check #{}", attempt),
        },
        PollState::Ready(report) => match &report.site_url {
            Some(url) => format!("ready at {}", url),
            None => "ready".to_string(),
        },
        PollState::Delayed { attempts, .. } => format!(
            "still not ready after {} checks; provisioning may finish in the background",
            attempts
        ),
        PollState::Error(message) => format!("failed: {}", message),
    }
}

/// Process exit code for a terminal polling state.
pub fn poll_exit_code(state: &PollState) -> i32 {
    match state {
        PollState::Ready(_) => 0,
        PollState::Delayed { .. } => 2,
        _ => 1,
    }
}
