use std::io::{BufRead, Write};

use serde_json::json;

use crate::error::{MigrateError, Result};
use crate::model::Id;
use crate::output::Format;
use crate::store::ledger::{InitSettings, LedgerStore};

/// Settings given on the command line; anything missing is prompted for.
#[derive(Debug, Clone, Default)]
pub struct InitArgs {
    pub origin_url: Option<String>,
    pub origin_api_key: Option<String>,
    pub origin_admin_id: Option<Id>,
    pub destination_url: Option<String>,
    pub destination_api_key: Option<String>,
    pub destination_admin_id: Option<Id>,
    pub destination_admin_email: Option<String>,
    pub preserve_invite_links: Option<bool>,
}

/// Prompts on `output` and reads one answer per line from `input`.
struct Prompter<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Prompter<'_, R, W> {
    fn ask(&mut self, question: &str) -> Result<String> {
        loop {
            write!(self.output, "{question}: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Err(MigrateError::InvalidInput(format!(
                    "no answer for {question:?}"
                )));
            }
            let answer = line.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
        }
    }

    fn text(&mut self, given: Option<String>, question: &str) -> Result<String> {
        match given {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => self.ask(question),
        }
    }

    fn id(&mut self, given: Option<Id>, question: &str) -> Result<Id> {
        if let Some(id) = given {
            return Ok(id);
        }
        let answer = self.ask(question)?;
        answer
            .parse()
            .map_err(|_| MigrateError::InvalidInput(format!("{answer:?} is not a numeric id")))
    }

    fn yes_no(&mut self, given: Option<bool>, question: &str) -> Result<bool> {
        if let Some(value) = given {
            return Ok(value);
        }
        match self.ask(&format!("{question} [y/n]"))?.to_lowercase().as_str() {
            "y" | "yes" | "true" => Ok(true),
            "n" | "no" | "false" => Ok(false),
            other => Err(MigrateError::InvalidInput(format!(
                "{other:?} is not a yes/no answer"
            ))),
        }
    }
}

/// Fill in every setting, prompting for the ones not passed as flags.
pub fn resolve<R: BufRead, W: Write>(
    args: InitArgs,
    input: &mut R,
    output: &mut W,
) -> Result<InitSettings> {
    let mut p = Prompter { input, output };
    Ok(InitSettings {
        origin_url: p.text(args.origin_url, "Origin instance URL")?,
        origin_api_key: p.text(args.origin_api_key, "Origin admin API key")?,
        origin_admin_user_id: p.id(args.origin_admin_id, "Origin admin user id")?,
        destination_url: p.text(args.destination_url, "Destination instance URL")?,
        destination_api_key: p.text(args.destination_api_key, "Destination admin API key")?,
        destination_admin_user_id: p.id(args.destination_admin_id, "Destination admin user id")?,
        destination_admin_email: p.text(
            args.destination_admin_email,
            "Destination admin email",
        )?,
        preserve_invite_links: p.yes_no(
            args.preserve_invite_links,
            "Keep invite links in the ledger",
        )?,
    })
}

pub fn run<R: BufRead, W: Write>(
    store: &LedgerStore,
    args: InitArgs,
    input: &mut R,
    prompts: &mut W,
    format: Format,
) -> Result<()> {
    if store.exists() {
        return Err(MigrateError::AlreadyInitialized(
            store.path().display().to_string(),
        ));
    }

    let settings = resolve(args, input, prompts)?;
    let ledger = store.init(settings)?;

    match format {
        Format::Json => println!(
            "{}",
            json!({
                "ledger": store.path().display().to_string(),
                "origin_url": ledger.settings.origin_url,
                "destination_url": ledger.settings.destination_url,
            })
        ),
        Format::Pretty => eprintln!("Initialized ledger at {}", store.path().display()),
    }
    Ok(())
}
