//! Configuration errors as the binary builds them.

use happylife::{config::LoadError, error::AppError};

#[test]
fn missing_realtime_database_is_reported_as_configuration() {
    let error = AppError::from(LoadError::invalid(
        "realtime.database_url",
        "required to install triggers",
    ));

    assert!(matches!(error, AppError::Config(LoadError::Invalid { .. })));
    assert_eq!(
        error.to_string(),
        "invalid configuration for `realtime.database_url`: required to install triggers"
    );
}
