use dialoguer::{Input, Password};
use vmkit::{Credential, CredentialProvider};

/// Password source for non-interactive runs
pub const PASSWORD_ENV: &str = "LABVM_PASSWORD";

/// Asks for the user name (when unknown) and password on the terminal.
///
/// `LABVM_PASSWORD` skips the password prompt.
#[derive(Debug, Default)]
pub struct TerminalCredentials;

impl CredentialProvider for TerminalCredentials {
    fn credential(&self, host: &str, username: Option<&str>) -> vmkit::Result<Credential> {
        let username = match username {
            Some(user) => user.to_string(),
            None => Input::new()
                .with_prompt(format!("User name for {host}"))
                .default("root".to_string())
                .interact_text()
                .map_err(prompt_error)?,
        };

        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ => Password::new()
                .with_prompt(format!("Password for {username}@{host}"))
                .interact()
                .map_err(prompt_error)?,
        };

        Ok(Credential::new(username, password))
    }
}

fn prompt_error(e: dialoguer::Error) -> vmkit::Error {
    vmkit::Error::Other(format!("failed to read credentials: {e}"))
}
