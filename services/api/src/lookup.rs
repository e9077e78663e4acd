use crate::infra::build_application_service;
use clap::Args;
use pasantia::config::AppConfig;
use pasantia::db;
use pasantia::error::AppError;
use pasantia::notifications::{LogNotifier, OutboundMail};
use pasantia::solicitudes::{ApplicationDetail, SolicitudServiceError};

#[derive(Args, Debug)]
pub(crate) struct LookupArgs {
    /// Application number, e.g. 2602001
    pub(crate) number: String,
    /// Print the JSON payload the status-check page receives
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_lookup(args: LookupArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let pool = db::connect(&config.database).await?;
    let service =
        build_application_service(&config, pool, OutboundMail::Log(LogNotifier)).await?;

    let detail = match service.detail_by_number(&args.number).await {
        Ok(detail) => detail,
        Err(SolicitudServiceError::NotFound(number)) => {
            println!("No application found with number {number}");
            return Ok(());
        }
        Err(err) => {
            println!("Lookup failed: {err}");
            return Ok(());
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&detail.view()) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Payload unavailable: {err}"),
        }
    } else {
        print!("{}", render_detail(&detail));
    }
    Ok(())
}

fn render_detail(detail: &ApplicationDetail) -> String {
    let application = &detail.application;
    let display = detail.display_state();
    let mut out = String::new();

    out.push_str(&format!("Application {}\n", application.number));
    out.push_str(&format!(
        "- Applicant: {} <{}> (cédula {})\n",
        application.full_name, application.email, application.national_id
    ));
    out.push_str(&format!(
        "- State: {} (stored: {})\n",
        display.label(),
        application.state.label()
    ));
    out.push_str(&format!(
        "- Created: {}\n",
        application.created_at.format("%Y-%m-%d %H:%M UTC")
    ));

    if detail.current_attachments.is_empty() {
        out.push_str("Current documents: none\n");
    } else {
        out.push_str("Current documents:\n");
        for attachment in &detail.current_attachments {
            out.push_str(&format!(
                "  - [{}] {}\n",
                attachment.id.0, attachment.file_name
            ));
        }
    }

    if let Some(certification) = &detail.certification {
        out.push_str(&format!(
            "Certification: {} issued {}\n",
            certification.file_name,
            certification.issued_at.format("%Y-%m-%d")
        ));
    }

    if !detail.history.is_empty() {
        out.push_str("History (newest first):\n");
        for entry in &detail.history {
            out.push_str(&format!(
                "  - {} | {} | {} document(s) retired\n",
                entry.record.recorded_at.format("%Y-%m-%d %H:%M"),
                entry.record.comment,
                entry.retired.len()
            ));
        }
    }

    out
}
