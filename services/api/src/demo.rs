use crate::infra::{
    DisabledExtractor, InMemoryClientRepository, InMemoryDocumentStore,
    InMemoryFeeRecordRepository, InMemoryPermitRepository,
};
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime};
use clap::Args;
use permit_desk::config::AppConfig;
use permit_desk::error::AppError;
use permit_desk::workflows::clients::{
    AutosaveField, ClientProfile, ClientRosterImporter, ClientService, FeeFlag, ProtocolSink,
    TaxId, TaxRegime,
};
use permit_desk::workflows::permits::{
    days_until_expiration, format_date_safe, remaining_time_label, ClientId, FeeLedger,
    FeePatch, FinalizeInput, FixedClock, NewPermit, NoteHistory, Permit, PermitId, PermitService,
    PermitType, PermitView, ProcessingStatus, RenewalForm, StagedDocument, StatusPolicy,
    TransitionOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_AUTHOR: &str = "demo";

#[derive(Args, Debug, Default)]
pub(crate) struct StatusArgs {
    /// Issue date (YYYY-MM-DD). Without it the permit is still in opening.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) issued: Option<NaiveDate>,
    /// Expiration date (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) expires: Option<NaiveDate>,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Override the configured warning window, in days
    #[arg(long)]
    pub(crate) window: Option<i64>,
    /// Permit is exempt (isento)
    #[arg(long)]
    pub(crate) exempt: bool,
    /// Permit has no fixed location (sem ponto fixo)
    #[arg(long)]
    pub(crate) no_fixed_location: bool,
    /// Permit is being renewed
    #[arg(long)]
    pub(crate) renewing: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RosterArgs {
    /// Roster CSV exported from the client spreadsheet
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo pretends it is (defaults to today)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let mut policy = StatusPolicy::from(&config.permits);
    if let Some(window) = args.window {
        policy.expiring_window_days = window.max(0);
    }
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let permit = Permit {
        id: PermitId("cli".to_string()),
        client_id: ClientId("cli".to_string()),
        permit_type: PermitType::Functioning,
        request_date: args.issued.unwrap_or(today),
        issue_date: args.issued,
        expiration_date: args.expires,
        processing_status: if args.renewing {
            ProcessingStatus::Renewal
        } else {
            ProcessingStatus::Started
        },
        exempt: args.exempt,
        no_fixed_location: args.no_fixed_location,
        notes: NoteHistory::default(),
        fees: FeeLedger::default(),
    };

    let days = days_until_expiration(permit.expiration_date, today);
    println!("Evaluated on {}", format_date_safe(Some(today)));
    println!("- expiration: {}", format_date_safe(permit.expiration_date));
    println!(
        "- status: {} ({} day window)",
        policy.compute_status(&permit, today).label(),
        policy.expiring_window_days
    );
    println!("- remaining: {}", remaining_time_label(days));
    let badges: Vec<&str> = policy
        .display_badges(&permit, today)
        .into_iter()
        .map(|badge| badge.label())
        .collect();
    println!("- badges: {}", badges.join(", "));
    Ok(())
}

pub(crate) fn run_roster_preview(args: RosterArgs) -> Result<(), AppError> {
    let parse = ClientRosterImporter::from_path(&args.csv)?;

    println!("Roster {}", args.csv.display());
    println!("{} client(s) ready to import", parse.profiles.len());
    for (line, profile) in &parse.profiles {
        println!(
            "  - line {}: {} ({})",
            line,
            profile.legal_name,
            profile.tax_id.formatted()
        );
    }

    if !parse.skipped.is_empty() {
        println!("{} row(s) skipped", parse.skipped.len());
        for row in &parse.skipped {
            println!(
                "  - line {}: {} [{}]",
                row.line,
                row.reason,
                row.tax_id.as_deref().unwrap_or("no tax id")
            );
        }
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let now = today.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN));

    let clients = Arc::new(InMemoryClientRepository::default());
    let client_service = Arc::new(ClientService::new(
        clients.clone(),
        Arc::new(InMemoryFeeRecordRepository::default()),
    ));
    let documents = Arc::new(InMemoryDocumentStore::default());
    let permit_service = PermitService::new(
        Arc::new(InMemoryPermitRepository::default()),
        clients,
        documents.clone(),
        Arc::new(DisabledExtractor),
    )
    .with_clock(Arc::new(FixedClock(now)))
    .with_policy(StatusPolicy::from(&config.permits));

    println!("Permit desk demo ({})", format_date_safe(Some(today)));

    let tax_id = match TaxId::parse("11.222.333/0001-81") {
        Ok(tax_id) => tax_id,
        Err(err) => {
            println!("  Invalid demo tax id: {}", err);
            return Ok(());
        }
    };
    let mut profile = ClientProfile::new(tax_id, "Padaria Central LTDA");
    profile.trade_name = Some("Pão Quente".to_string());
    profile.jurisdiction = Some("São Paulo".to_string());
    profile.tax_regime = Some(TaxRegime::SimplesNacional);
    let client = client_service.create(profile)?;
    println!(
        "- Client {} registered: {} ({})",
        client.id,
        client.display_name(),
        client.tax_id.formatted()
    );

    let mut new_permit = NewPermit::new(
        client.id.clone(),
        PermitType::Functioning,
        today - Duration::days(30),
    );
    new_permit.note = Some("Pedido protocolado na prefeitura".to_string());
    let opened = permit_service.create(new_permit, DEMO_AUTHOR)?;
    let permit_id = opened.permit.id.clone();
    print_view("Opened", &opened);

    match permit_service.finalize(&permit_id, FinalizeInput::default(), DEMO_AUTHOR) {
        Ok(_) => println!("  Finalize without documents unexpectedly succeeded"),
        Err(err) => println!("- Finalize without documents refused: {}", err),
    }

    let finalize = FinalizeInput {
        expiration_date: Some(today + Duration::days(20)),
        documents: vec![demo_pdf("alvara-funcionamento.pdf")],
        ..FinalizeInput::default()
    };
    match permit_service.finalize(&permit_id, finalize, DEMO_AUTHOR) {
        Ok(outcome) => print_outcome("Finalized", &outcome),
        Err(err) => {
            println!("  Finalize failed: {}", err);
            return Ok(());
        }
    }

    match permit_service.report() {
        Ok(report) => println!(
            "- Dashboard: {} permit(s), {} expiring, {} expired",
            report.total, report.counts.expiring, report.counts.expired
        ),
        Err(err) => println!("  Report unavailable: {}", err),
    }

    if let Err(err) = permit_service.enter_renewal(
        &permit_id,
        Some("Renovação solicitada ao cliente"),
        DEMO_AUTHOR,
    ) {
        println!("  Renewal refused: {}", err);
        return Ok(());
    }

    let mut form = RenewalForm {
        note_buffer: "Vistoria agendada".to_string(),
        ..RenewalForm::default()
    };
    if let Err(err) = permit_service.update_renewal(&permit_id, &mut form, DEMO_AUTHOR) {
        println!("  Renewal update refused: {}", err);
    }

    form.expiration_date = Some(today + Duration::days(365));
    form.stage(demo_pdf("alvara-renovado.pdf"));
    match permit_service.finalize_renewal(&permit_id, &mut form, DEMO_AUTHOR) {
        Ok(outcome) => {
            print_outcome("Renewed", &outcome);
            println!("  History (newest first):");
            for line in outcome.permit.permit.notes.render() {
                println!("    {}", line);
            }
        }
        Err(err) => println!("  Renewal finalization refused: {}", err),
    }

    match permit_service.documents(&permit_id) {
        Ok(stored) => {
            println!(
                "- {} document(s) stored ({} bytes)",
                stored.len(),
                documents.total_bytes()
            );
            for entry in stored {
                let link = permit_service
                    .download_link(&entry.document.id)
                    .map(|link| link.url)
                    .unwrap_or_else(|err| format!("link unavailable: {err}"));
                println!("  - {} -> {}", entry.document.file_name, link);
            }
        }
        Err(err) => println!("  Document listing unavailable: {}", err),
    }

    let year = today.year();
    let patch = FeePatch {
        fee_sent: Some(true),
        fee_sent_date: Some(today),
        ..FeePatch::default()
    };
    match permit_service.upsert_fee(&permit_id, year, &patch) {
        Ok(fee) => println!(
            "- {} permit fee sent on {} (paid: {})",
            fee.year,
            format_date_safe(fee.fee_sent_date),
            fee.fee_paid
        ),
        Err(err) => println!("  Fee update failed: {}", err),
    }

    if let Err(err) = client_service.toggle_fee(&client.id, year, FeeFlag::Generated) {
        println!("  Client fee toggle failed: {}", err);
    }

    let sink = Arc::new(ProtocolSink::new(
        client_service.clone(),
        client.id.clone(),
        year,
    ));
    let field = AutosaveField::spawn("", config.autosave.quiet_interval(), sink);
    let edits = field
        .edit("PRT-")
        .and_then(|_| field.edit(format!("PRT-{year}-0042")));
    let saved = match edits {
        Ok(()) => field.close().await,
        Err(err) => Err(err),
    };
    match saved {
        Ok(state) => println!(
            "- Protocol autosaved as '{}' after {} save(s)",
            state.saved, state.saves
        ),
        Err(err) => println!("  Protocol autosave failed: {}", err),
    }
    match client_service.fee(&client.id, year) {
        Ok(record) => println!(
            "  Client fee {}: gerada={} enviada={} paga={} protocolo={}",
            record.year, record.generated, record.sent, record.paid, record.protocol
        ),
        Err(err) => println!("  Client fee unavailable: {}", err),
    }

    match permit_service.extract(&demo_pdf("alvara-sanitario.pdf")) {
        Ok(draft) => println!("- Extraction confidence {}", draft.confidence),
        Err(err) => println!("- PDF extraction skipped: {}", err),
    }

    Ok(())
}

fn demo_pdf(name: &str) -> StagedDocument {
    StagedDocument::new(name, b"%PDF-1.7 demo".to_vec())
}

fn print_view(action: &str, view: &PermitView) {
    let badges: Vec<&str> = view.badges.iter().map(|badge| badge.label()).collect();
    println!(
        "- {} {} ({}) -> {} | {} | {}",
        action,
        view.permit.id,
        view.permit.permit_type,
        view.lifecycle,
        badges.join(", "),
        view.remaining_time
    );
}

fn print_outcome(action: &str, outcome: &TransitionOutcome) {
    print_view(action, &outcome.permit);
    for uploaded in &outcome.uploaded {
        println!("  uploaded {} as {}", uploaded.file_name, uploaded.document_id);
    }
    for failed in &outcome.failed_uploads {
        println!("  upload failed for {}: {}", failed.file_name, failed.reason);
    }
    if let Some(reason) = &outcome.note_failure {
        println!("  attachment note not recorded: {reason}");
    }
}
