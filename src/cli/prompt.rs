//! 终端凭据输入

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};

use crate::domain::{Credentials, Secret};
use crate::services::PromptCredentials;

/// 使用 dialoguer 在终端询问用户名、密码和配置名称
///
/// 重试时保留上次输入的用户名和配置名称作为默认值，密码每次重新输入。
pub struct TerminalPrompt {
    username: Option<String>,
    configuration: Option<String>,
    /// 命令行已指定配置名称时不再询问
    ask_configuration: bool,
    theme: ColorfulTheme,
}

impl TerminalPrompt {
    pub fn new(username: Option<String>, configuration: Option<String>) -> Self {
        Self {
            username,
            ask_configuration: configuration.is_none(),
            configuration,
            theme: ColorfulTheme::default(),
        }
    }

    fn collect(&mut self) -> dialoguer::Result<Credentials> {
        let mut input = Input::<String>::with_theme(&self.theme).with_prompt("Username");
        if let Some(username) = &self.username {
            input = input.default(username.clone());
        }
        let username = input.interact_text()?;

        let password = Password::with_theme(&self.theme)
            .with_prompt("Password")
            .interact()?;

        let configuration = if self.ask_configuration {
            let mut input = Input::<String>::with_theme(&self.theme)
                .with_prompt("Configuration (blank for deploy.config.json)")
                .allow_empty(true);
            if let Some(configuration) = &self.configuration {
                input = input.default(configuration.clone());
            }
            let entered = input.interact_text()?;
            self.configuration = Some(entered.trim().to_string()).filter(|c| !c.is_empty());
            self.configuration.clone()
        } else {
            self.configuration.clone()
        };

        self.username = Some(username.clone());
        Ok(Credentials::new(username, Secret::new(password), configuration))
    }
}

impl PromptCredentials for TerminalPrompt {
    fn prompt(&mut self, attempt: u32, previous_error: Option<&str>) -> Option<Credentials> {
        if let Some(error) = previous_error {
            eprintln!();
            eprintln!("{}", error);
            eprintln!("Please try again (attempt {}).", attempt);
        }

        match self.collect() {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::debug!(error = %e, "Credential prompt closed");
                None
            }
        }
    }
}
