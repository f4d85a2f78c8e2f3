//! End-to-end invoice flows against the in-memory store.

use chrono::NaiveDate;
use serde_json::Value;
use std::cell::Cell;
use std::sync::mpsc::Receiver;

use timecard_invoicer::Error;
use timecard_invoicer::billable::{self, GenerationMode, ServicePeriod};
use timecard_invoicer::config::{PricingOwner, ProjectDeletion};
use timecard_invoicer::engine::{BillingTerms, InvoiceInputs, assemble_invoice};
use timecard_invoicer::ledger::{self, ClientForm, CompanyForm, ProjectForm, TimecardForm};
use timecard_invoicer::model::{
    BankDetails, Client, FixedRate, Invoice, InvoiceData, InvoiceStatus, Language, MY_COMPANY_ID, Project,
    RateType, Timecard, TimecardStatus,
};
use timecard_invoicer::rates::{ExchangeRate, RateProvider, select_exchange_rate};
use timecard_invoicer::store::{Batch, DocumentStore, DocumentStoreExt, JsonStore};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const MAY: ServicePeriod = ServicePeriod { month: 5, year: 2024 };

struct CountingProvider {
    rate: f64,
    calls: Cell<u32>,
}

impl RateProvider for CountingProvider {
    fn get_rate(&self, _currency: &str) -> ExchangeRate {
        self.calls.set(self.calls.get() + 1);
        ExchangeRate { rate: Some(self.rate), date: Some(day(2024, 5, 31)) }
    }
}

/// Delegates reads, rejects every batch that writes an invoice.
struct RejectingStore {
    inner: JsonStore,
}

impl DocumentStore for RejectingStore {
    fn get_doc(&self, collection: &str, id: &str) -> timecard_invoicer::Result<Option<Value>> {
        self.inner.get_doc(collection, id)
    }

    fn list_docs(&self, collection: &str) -> timecard_invoicer::Result<Vec<Value>> {
        self.inner.list_docs(collection)
    }

    fn commit(&self, batch: Batch) -> timecard_invoicer::Result<()> {
        let touches_invoices = batch.writes().iter().any(|w| {
            matches!(w, timecard_invoicer::store::Write::Set { collection: "invoices", .. })
        });
        if touches_invoices {
            return Err(Error::Commit("quota exceeded".into()));
        }
        self.inner.commit(batch)
    }

    fn subscribe(&self, collection: &str) -> Receiver<Vec<Value>> {
        self.inner.subscribe(collection)
    }
}

fn client_form(name: &str) -> ClientForm {
    ClientForm {
        name: name.into(),
        address: "Bd. Unirii 10, Bucharest".into(),
        tax_id: "RO12345".into(),
        bank: BankDetails::default(),
        language: Language::English,
        currency: "EUR".into(),
        has_vat: true,
        max_exchange_rate: None,
        invoice_prefix: None,
        rate: None,
        rate_type: None,
    }
}

fn project_form(client: &Client, rate: f64, rate_type: RateType) -> ProjectForm {
    ProjectForm {
        name: "Web Shop".into(),
        client_id: client.id.clone(),
        currency: "EUR".into(),
        has_vat: true,
        rate,
        rate_type,
        max_exchange_rate: None,
        invoice_prefix: None,
        theme: None,
    }
}

fn timecard_form(project: &Project, date: NaiveDate, hours: f64) -> TimecardForm {
    TimecardForm { project_id: project.id.clone(), date, end_date: None, hours, description: None }
}

struct Fixture<S: DocumentStore> {
    store: S,
    client: Client,
    project: Project,
    cards: Vec<Timecard>,
}

fn fixture<S: DocumentStore>(store: S) -> Fixture<S> {
    ledger::ensure_company(&store).unwrap();
    let client = ledger::create_client(&store, client_form("Innovate Inc.")).unwrap();
    let project = ledger::create_project(&store, project_form(&client, 50.0, RateType::Hourly)).unwrap();
    let cards = vec![
        ledger::log_timecard(&store, timecard_form(&project, day(2024, 5, 6), 4.0)).unwrap(),
        ledger::log_timecard(&store, timecard_form(&project, day(2024, 5, 7), 4.0)).unwrap(),
    ];
    Fixture { store, client, project, cards }
}

fn draft<S: DocumentStore>(f: &Fixture<S>, selected: Vec<String>) -> InvoiceData {
    let company = ledger::ensure_company(&f.store).unwrap();
    let timecards = f.store.list::<Timecard>().unwrap();
    let history = f.store.list::<Invoice>().unwrap();
    let terms = BillingTerms::resolve(PricingOwner::Project, &f.client, &f.project);
    let quantity = billable::resolve(
        &GenerationMode::Timecards { selected },
        terms.pricing(&f.client, &f.project),
        MAY,
        &timecards,
    );
    let provider = CountingProvider { rate: 4.97, calls: Cell::new(0) };
    let exchange = select_exchange_rate(terms.currency, terms.fixed_rate, &provider, day(2024, 6, 1));

    assemble_invoice(&InvoiceInputs {
        client: Some(&f.client),
        project: Some(&f.project),
        company: Some(&company),
        owner: PricingOwner::Project,
        billable: quantity.as_ref(),
        currency: None,
        exchange,
        period: MAY,
        issue_date: day(2024, 6, 1),
        history: &history,
    })
    .unwrap()
}

fn ids(cards: &[Timecard]) -> Vec<String> {
    cards.iter().map(|c| c.id.clone()).collect()
}

#[test]
fn saving_bills_consumed_timecards() {
    let f = fixture(JsonStore::in_memory());
    let invoice = draft(&f, ids(&f.cards));
    assert_eq!(invoice.items[0].quantity, 8.0);
    assert_eq!(invoice.subtotal, 400.0);

    let invoice_id = ledger::save_invoice(&f.store, invoice).unwrap();

    for card in &f.cards {
        let stored: Timecard = f.store.fetch(&card.id).unwrap();
        assert_eq!(stored.status, TimecardStatus::Billed);
        assert_eq!(stored.invoice_id.as_deref(), Some(invoice_id.as_str()));

        let edit = ledger::edit_timecard(&f.store, &card.id, timecard_form(&f.project, card.date, 1.0));
        assert!(matches!(edit, Err(Error::Immutable(_))));
        assert!(matches!(ledger::delete_timecard(&f.store, &card.id), Err(Error::Immutable(_))));
    }

    let saved: Invoice = f.store.fetch(&invoice_id).unwrap();
    assert_eq!(saved.status, InvoiceStatus::Created);
    assert_eq!(saved.data.billed_timecard_ids.len(), 2);
}

#[test]
fn stored_invoice_has_no_vat_rate_key_when_vat_does_not_apply() {
    let store = JsonStore::in_memory();
    ledger::ensure_company(&store).unwrap();
    let client = ledger::create_client(&store, client_form("Acme")).unwrap();
    let mut form = project_form(&client, 100.0, RateType::Daily);
    form.has_vat = false;
    form.currency = "RON".into();
    let project = ledger::create_project(&store, form).unwrap();
    let f = Fixture { store, client, project, cards: vec![] };

    let company = ledger::ensure_company(&f.store).unwrap();
    let terms = BillingTerms::resolve(PricingOwner::Project, &f.client, &f.project);
    let quantity =
        billable::resolve(&GenerationMode::Manual { quantity: 3.0 }, terms.pricing(&f.client, &f.project), MAY, &[]);
    let data = assemble_invoice(&InvoiceInputs {
        client: Some(&f.client),
        project: Some(&f.project),
        company: Some(&company),
        owner: PricingOwner::Project,
        billable: quantity.as_ref(),
        currency: None,
        exchange: select_exchange_rate("RON", None, &CountingProvider { rate: 0.0, calls: Cell::new(0) }, day(2024, 6, 1)),
        period: MAY,
        issue_date: day(2024, 6, 1),
        history: &[],
    })
    .unwrap();
    let id = ledger::save_invoice(&f.store, data).unwrap();

    let raw = f.store.get_doc("invoices", &id).unwrap().unwrap();
    assert!(raw.get("vatRate").is_none());
    assert_eq!(raw["totalRon"], 300.0);
    assert_eq!(raw["invoiceNumber"], "WS001");
}

#[test]
fn failed_save_changes_nothing() {
    let f = fixture(RejectingStore { inner: JsonStore::in_memory() });
    let invoice = draft(&f, ids(&f.cards));
    let number = invoice.invoice_number.clone();

    let err = ledger::save_invoice(&f.store, invoice.clone()).unwrap_err();
    assert!(matches!(err, Error::Commit(_)));

    for card in &f.cards {
        let stored: Timecard = f.store.fetch(&card.id).unwrap();
        assert_eq!(stored.status, TimecardStatus::Unbilled);
        assert_eq!(stored.invoice_id, None);
    }
    let invoices = f.store.list::<Invoice>().unwrap();
    assert!(invoices.iter().all(|i| i.data.invoice_number != number));

    // The draft is intact and can be retried against a healthy store
    let healthy = JsonStore::in_memory();
    for card in f.store.list::<Timecard>().unwrap() {
        healthy.put(&card).unwrap();
    }
    assert!(ledger::save_invoice(&healthy, invoice).is_ok());
}

#[test]
fn timecard_cannot_be_billed_twice() {
    let f = fixture(JsonStore::in_memory());
    let first = draft(&f, ids(&f.cards));
    let stale = first.clone();
    ledger::save_invoice(&f.store, first).unwrap();

    let err = ledger::save_invoice(&f.store, stale).unwrap_err();
    assert!(matches!(err, Error::Immutable(_)));
    assert_eq!(f.store.list::<Invoice>().unwrap().len(), 1);
}

#[test]
fn numbering_continues_from_history() {
    let f = fixture(JsonStore::in_memory());
    let first = draft(&f, vec![f.cards[0].id.clone()]);
    assert_eq!(first.invoice_number, "WS001");
    ledger::save_invoice(&f.store, first).unwrap();

    let second = draft(&f, vec![f.cards[1].id.clone()]);
    assert_eq!(second.invoice_number, "WS002");
}

#[test]
fn fixed_rate_is_never_refetched_across_currency_changes() {
    let store = JsonStore::in_memory();
    let client = ledger::create_client(&store, client_form("Innovate Inc.")).unwrap();
    let mut form = project_form(&client, 500.0, RateType::Daily);
    form.max_exchange_rate = Some(FixedRate { rate: 4.9, date: day(2024, 1, 15) });
    let project = ledger::create_project(&store, form).unwrap();

    let terms = BillingTerms::resolve(PricingOwner::Project, &client, &project);
    let provider = CountingProvider { rate: 5.1, calls: Cell::new(0) };
    for currency in ["EUR", "USD", "GBP"] {
        let sel = select_exchange_rate(currency, terms.fixed_rate, &provider, day(2024, 6, 1));
        assert!(sel.used_fixed);
        assert_eq!(sel.rate, Some(4.9));
    }
    assert_eq!(provider.calls.get(), 0);

    let plain = CountingProvider { rate: 5.1, calls: Cell::new(0) };
    let sel = select_exchange_rate("USD", None, &plain, day(2024, 6, 1));
    assert!(!sel.used_fixed);
    assert_eq!(plain.calls.get(), 1);
}

#[test]
fn status_moves_forward_only() {
    let f = fixture(JsonStore::in_memory());
    let id = ledger::save_invoice(&f.store, draft(&f, ids(&f.cards))).unwrap();

    let skip = ledger::advance_invoice_status(&f.store, &id, InvoiceStatus::Paid);
    assert!(matches!(skip, Err(Error::InvalidTransition { .. })));

    ledger::advance_invoice_status(&f.store, &id, InvoiceStatus::Sent).unwrap();
    ledger::advance_invoice_status(&f.store, &id, InvoiceStatus::Paid).unwrap();

    let back = ledger::advance_invoice_status(&f.store, &id, InvoiceStatus::Sent);
    assert!(matches!(back, Err(Error::InvalidTransition { .. })));
    assert_eq!(f.store.fetch::<Invoice>(&id).unwrap().status, InvoiceStatus::Paid);
}

#[test]
fn deleting_invoice_keeps_timecards_billed() {
    let f = fixture(JsonStore::in_memory());
    let id = ledger::save_invoice(&f.store, draft(&f, ids(&f.cards))).unwrap();
    ledger::delete_invoice(&f.store, &id).unwrap();

    assert!(f.store.get::<Invoice>(&id).unwrap().is_none());
    for card in &f.cards {
        assert!(f.store.fetch::<Timecard>(&card.id).unwrap().is_billed());
    }
}

#[test]
fn deleting_client_cascades() {
    let f = fixture(JsonStore::in_memory());
    ledger::save_invoice(&f.store, draft(&f, vec![f.cards[0].id.clone()])).unwrap();
    let other = ledger::create_client(&f.store, client_form("Other Ltd")).unwrap();
    let other_project = ledger::create_project(&f.store, project_form(&other, 10.0, RateType::Hourly)).unwrap();
    ledger::log_timecard(&f.store, timecard_form(&other_project, day(2024, 5, 1), 1.0)).unwrap();

    ledger::delete_client(&f.store, &f.client.id).unwrap();

    assert!(f.store.get::<Client>(&f.client.id).unwrap().is_none());
    assert!(f.store.list::<Project>().unwrap().iter().all(|p| p.client_id == other.id));
    assert!(f.store.list::<Invoice>().unwrap().is_empty());
    let remaining = f.store.list::<Timecard>().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].project_id, other_project.id);
}

#[test]
fn company_profile_survives_client_deletion_and_merges_updates() {
    let f = fixture(JsonStore::in_memory());
    let placeholder = ledger::ensure_company(&f.store).unwrap();
    assert_eq!(placeholder.vat_rate, 0.19);

    let updated = ledger::update_company(
        &f.store,
        CompanyForm {
            name: "Pixel Works SRL".into(),
            address: placeholder.address.clone(),
            tax_id: "RO777".into(),
            bank: placeholder.bank.clone(),
            vat_rate: 0.21,
            payment_terms_days: 14,
            email: Some("billing@pixel.works".into()),
            phone: None,
        },
    )
    .unwrap();
    assert_eq!(updated.id, MY_COMPANY_ID);

    assert!(matches!(ledger::delete_client(&f.store, MY_COMPANY_ID), Err(Error::NotFound { .. })));
    ledger::delete_client(&f.store, &f.client.id).unwrap();

    let company = ledger::ensure_company(&f.store).unwrap();
    assert_eq!(company.name, "Pixel Works SRL");
    assert_eq!(company.vat_rate, 0.21);
    assert_eq!(company.payment_terms_days, 14);
    assert_eq!(company.email.as_deref(), Some("billing@pixel.works"));
    assert_eq!(f.store.list_docs("profile").unwrap().len(), 1);
}

#[test]
fn deleting_client_removes_billed_timecards_of_deleted_projects() {
    let f = fixture(JsonStore::in_memory());
    let invoice_id = ledger::save_invoice(&f.store, draft(&f, vec![f.cards[0].id.clone()])).unwrap();

    ledger::delete_project(&f.store, &f.project.id, ProjectDeletion::KeepHistory).unwrap();
    let kept: Timecard = f.store.fetch(&f.cards[0].id).unwrap();
    assert_eq!(kept.invoice_id.as_deref(), Some(invoice_id.as_str()));

    ledger::delete_client(&f.store, &f.client.id).unwrap();

    assert!(f.store.list::<Invoice>().unwrap().is_empty());
    assert!(f.store.list::<Timecard>().unwrap().is_empty());
}

#[test]
fn invoice_keeps_client_snapshot_after_client_edit() {
    let f = fixture(JsonStore::in_memory());
    let mut form = client_form("Innovate Inc.");
    form.bank = BankDetails {
        iban: Some("RO49AAAA1B31007593840000".into()),
        bank_name: Some("Banca Transilvania".into()),
        swift: Some("BTRLRO22".into()),
    };
    let client = ledger::update_client(&f.store, &f.client.id, form).unwrap();
    let f = Fixture { client, ..f };

    let id = ledger::save_invoice(&f.store, draft(&f, ids(&f.cards))).unwrap();
    let before: Invoice = f.store.fetch(&id).unwrap();

    let mut renamed = client_form("Innovate Group");
    renamed.address = "Calea Victoriei 1, Bucharest".into();
    renamed.tax_id = "RO54321".into();
    renamed.bank = BankDetails { iban: Some("DE89370400440532013000".into()), bank_name: None, swift: None };
    ledger::update_client(&f.store, &f.client.id, renamed).unwrap();

    let after: Invoice = f.store.fetch(&id).unwrap();
    assert_eq!(after.data.client, before.data.client);
    assert_eq!(after.data.client.name, "Innovate Inc.");
    assert_eq!(after.data.client.tax_id, "RO12345");
    assert_eq!(after.data.client.bank.swift.as_deref(), Some("BTRLRO22"));
}

#[test]
fn project_deletion_keeps_history_by_default() {
    let f = fixture(JsonStore::in_memory());
    let invoice_id = ledger::save_invoice(&f.store, draft(&f, vec![f.cards[0].id.clone()])).unwrap();

    ledger::delete_project(&f.store, &f.project.id, ProjectDeletion::KeepHistory).unwrap();

    assert!(f.store.get::<Project>(&f.project.id).unwrap().is_none());
    assert!(f.store.get::<Invoice>(&invoice_id).unwrap().is_some());
    assert!(f.store.get::<Timecard>(&f.cards[0].id).unwrap().is_some());
    assert!(f.store.get::<Timecard>(&f.cards[1].id).unwrap().is_none());
}

#[test]
fn project_deletion_can_cascade() {
    let f = fixture(JsonStore::in_memory());
    ledger::save_invoice(&f.store, draft(&f, vec![f.cards[0].id.clone()])).unwrap();

    ledger::delete_project(&f.store, &f.project.id, ProjectDeletion::Cascade).unwrap();

    assert!(f.store.list::<Invoice>().unwrap().is_empty());
    assert!(f.store.list::<Timecard>().unwrap().is_empty());
}

#[test]
fn invalid_timecards_are_rejected_before_writing() {
    let f = fixture(JsonStore::in_memory());
    for hours in [0.0, -2.0, 1000.5] {
        let res = ledger::log_timecard(&f.store, timecard_form(&f.project, day(2024, 5, 8), hours));
        assert!(matches!(res, Err(Error::Validation(_))), "hours {hours} accepted");
    }
    let mut backwards = timecard_form(&f.project, day(2024, 5, 8), 2.0);
    backwards.end_date = Some(day(2024, 5, 1));
    assert!(matches!(ledger::log_timecard(&f.store, backwards), Err(Error::Validation(_))));

    assert_eq!(f.store.list::<Timecard>().unwrap().len(), 2);
    assert!(ledger::log_timecard(&f.store, timecard_form(&f.project, day(2024, 5, 8), 1000.0)).is_ok());
}

#[test]
fn client_rename_reaches_projects() {
    let f = fixture(JsonStore::in_memory());
    ledger::update_client(&f.store, &f.client.id, client_form("Innovate Group")).unwrap();

    let project: Project = f.store.fetch(&f.project.id).unwrap();
    assert_eq!(project.client_name, "Innovate Group");
    let card: Timecard = f.store.fetch(&f.cards[0].id).unwrap();
    assert_eq!(card.client_name, "Innovate Group");
}

#[test]
fn live_subscription_sees_billing() {
    let f = fixture(JsonStore::in_memory());
    let rx = f.store.subscribe("timecards");
    let initial = rx.recv().unwrap();
    assert!(initial.iter().all(|t| t["status"] == "Unbilled"));

    ledger::save_invoice(&f.store, draft(&f, ids(&f.cards))).unwrap();
    let after = rx.recv().unwrap();
    assert!(after.iter().all(|t| t["status"] == "Billed"));
}
