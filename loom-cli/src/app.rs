use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use loom_config::{load_config, LoomConfig};
use loom_core::{
    BankEntryType, BankStatement, CompanyId, CustomerId, DateRange, FabricIdentity, PaymentMethod,
    PaymentStatus, PurchaseId, SaleId, StatementId, StatementStatus, SupplierId,
};
use loom_ledger::{
    BankStatementQuery, Ledger, LedgerError, NewBankStatement, NewCompany, NewPayment,
    NewPurchase, NewSale, PurchaseLedgerQuery, SaleLedgerQuery,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};

use crate::export;
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "loom", about = "Fabric trading ledger: purchases, sales, stock and credit", version)]
pub struct Cli {
    /// Configuration profile loaded from config/<env>.toml
    #[arg(long, global = true, default_value = "default")]
    env: String,
    /// Database file, overriding database.path from the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Render command output as pretty JSON
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Company(CompanyCommand),
    #[command(subcommand)]
    Supplier(PartyCommand),
    #[command(subcommand)]
    Customer(PartyCommand),
    #[command(subcommand)]
    Purchase(PurchaseCommand),
    #[command(subcommand)]
    Sale(SaleCommand),
    #[command(subcommand)]
    Stock(StockCommand),
    #[command(subcommand)]
    Report(ReportCommand),
    #[command(subcommand)]
    Bank(BankCommand),
    #[command(subcommand)]
    Db(DbCommand),
    #[command(subcommand)]
    Export(ExportCommand),
}

#[derive(Subcommand)]
enum CompanyCommand {
    Add(CompanyAddArgs),
    List,
    Delete { id: CompanyId },
}

#[derive(Args)]
struct CompanyAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    tax_number: Option<String>,
    #[arg(long)]
    license_number: Option<String>,
    #[arg(long)]
    website: Option<String>,
}

#[derive(Subcommand)]
enum PartyCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: Option<String>,
    },
    List,
    Delete {
        id: i64,
    },
}

#[derive(Args)]
struct FabricArgs {
    #[arg(long)]
    fabric_type: String,
    #[arg(long)]
    fabric_code: Option<String>,
    #[arg(long)]
    composition: Option<String>,
}

impl FabricArgs {
    fn identity(self) -> FabricIdentity {
        FabricIdentity::new(self.fabric_type, self.fabric_code, self.composition)
    }
}

#[derive(Args)]
struct WindowArgs {
    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl WindowArgs {
    fn range(&self) -> DateRange {
        DateRange::new(self.from, self.to)
    }
}

#[derive(Args)]
struct PayArgs {
    id: i64,
    #[arg(long)]
    amount: Decimal,
    #[arg(long, default_value = "cash")]
    method: PaymentMethod,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    recorded_by: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl PayArgs {
    fn payment(self) -> NewPayment {
        NewPayment {
            amount: self.amount,
            method: self.method,
            reference: self.reference,
            notes: self.notes,
            recorded_by: self.recorded_by,
            date: self.date.map(day_start),
        }
    }
}

#[derive(Subcommand)]
enum PurchaseCommand {
    Record(PurchaseRecordArgs),
    Ledger(PurchaseLedgerArgs),
    Pending {
        #[arg(long)]
        supplier: Option<SupplierId>,
    },
    Pay(PayArgs),
    Payments {
        id: PurchaseId,
    },
}

#[derive(Args)]
struct PurchaseRecordArgs {
    #[arg(long)]
    supplier: SupplierId,
    #[command(flatten)]
    fabric: FabricArgs,
    #[arg(long)]
    quantity: Decimal,
    #[arg(long)]
    price: Decimal,
    #[arg(long, default_value = "cash")]
    method: PaymentMethod,
    #[arg(long, default_value = "paid")]
    status: PaymentStatus,
    /// Required when --status partial
    #[arg(long)]
    amount_paid: Option<Decimal>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct PurchaseLedgerArgs {
    #[arg(long)]
    supplier: Option<SupplierId>,
    #[arg(long)]
    fabric_type: Option<String>,
    #[arg(long)]
    fabric_code: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[command(flatten)]
    window: WindowArgs,
}

impl PurchaseLedgerArgs {
    fn query(self) -> PurchaseLedgerQuery {
        PurchaseLedgerQuery {
            supplier_id: self.supplier,
            fabric_type: self.fabric_type,
            fabric_code: self.fabric_code,
            range: self.window.range(),
            search: self.search,
        }
    }
}

#[derive(Subcommand)]
enum SaleCommand {
    Record(SaleRecordArgs),
    Ledger(SaleLedgerArgs),
    Pending {
        #[arg(long)]
        customer: Option<CustomerId>,
    },
    Pay(PayArgs),
    Payments {
        id: SaleId,
    },
}

#[derive(Args)]
struct SaleRecordArgs {
    #[arg(long)]
    customer: CustomerId,
    #[arg(long)]
    company: Option<CompanyId>,
    #[command(flatten)]
    fabric: FabricArgs,
    #[arg(long)]
    quantity: Decimal,
    #[arg(long)]
    price: Decimal,
    /// Skip sales tax for this sale
    #[arg(long, action = ArgAction::SetTrue)]
    no_tax: bool,
    /// Tax rate as a fraction; defaults to sales.default_tax_rate
    #[arg(long)]
    tax_rate: Option<Decimal>,
    #[arg(long, default_value = "cash")]
    method: PaymentMethod,
    /// Hint only: the stored status follows the amount paid
    #[arg(long, default_value = "paid")]
    status: PaymentStatus,
    #[arg(long)]
    amount_paid: Option<Decimal>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args)]
struct SaleLedgerArgs {
    #[arg(long)]
    customer: Option<CustomerId>,
    #[arg(long)]
    company: Option<CompanyId>,
    #[arg(long)]
    fabric_type: Option<String>,
    #[arg(long)]
    fabric_code: Option<String>,
    #[arg(long)]
    search: Option<String>,
    /// Only taxed (true) or untaxed (false) sales
    #[arg(long)]
    taxed: Option<bool>,
    #[command(flatten)]
    window: WindowArgs,
}

impl SaleLedgerArgs {
    fn query(self) -> SaleLedgerQuery {
        SaleLedgerQuery {
            customer_id: self.customer,
            company_id: self.company,
            fabric_type: self.fabric_type,
            fabric_code: self.fabric_code,
            range: self.window.range(),
            search: self.search,
            apply_tax: self.taxed,
        }
    }
}

#[derive(Subcommand)]
enum StockCommand {
    Summary {
        #[arg(long)]
        search: Option<String>,
    },
    Available,
    Valuation,
}

#[derive(Subcommand)]
enum ReportCommand {
    Profit,
    Outstanding,
    Credit {
        /// Report supplier credit instead of customer credit
        #[arg(long, action = ArgAction::SetTrue)]
        suppliers: bool,
        #[command(flatten)]
        window: WindowArgs,
    },
    LedgerSummary {
        #[arg(long, action = ArgAction::SetTrue)]
        suppliers: bool,
        #[command(flatten)]
        window: WindowArgs,
    },
    PaymentHistory {
        #[arg(long, conflicts_with = "supplier")]
        customer: Option<CustomerId>,
        #[arg(long)]
        supplier: Option<SupplierId>,
        /// Supplier payments instead of customer payments
        #[arg(long, action = ArgAction::SetTrue)]
        suppliers: bool,
        #[command(flatten)]
        window: WindowArgs,
    },
}

#[derive(Subcommand)]
enum BankCommand {
    Add(BankAddArgs),
    Update {
        id: StatementId,
        #[arg(long)]
        status: StatementStatus,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long = "type")]
        entry_type: Option<BankEntryType>,
        #[arg(long)]
        status: Option<StatementStatus>,
        #[arg(long)]
        account: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
    },
    Summary {
        #[arg(long)]
        account: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
    },
    Reconcile {
        #[command(flatten)]
        window: WindowArgs,
    },
    Accounts,
}

#[derive(Args)]
struct BankAddArgs {
    #[arg(long = "type")]
    entry_type: BankEntryType,
    #[arg(long)]
    amount: Decimal,
    #[arg(long)]
    description: String,
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    sale: Option<SaleId>,
    #[arg(long)]
    purchase: Option<PurchaseId>,
    #[arg(long)]
    method: Option<PaymentMethod>,
    #[arg(long, default_value = "cleared")]
    status: StatementStatus,
    #[arg(long)]
    recorded_by: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum DbCommand {
    /// Copy a verified snapshot of the database to PATH
    Export { path: PathBuf },
    /// Replace the database with PATH, keeping a backup of the current file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum ExportCommand {
    Purchases {
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
    },
    Sales {
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
    },
    Stock {
        #[arg(long)]
        output: PathBuf,
    },
    Bank {
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
    },
}

struct Session {
    ledger: Ledger,
    config: LoomConfig,
    json: bool,
}

impl Session {
    fn emit<T: Serialize + ?Sized>(&self, value: &T, render: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            render(value);
        }
        Ok(())
    }
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

/// Exit status for a failed command: 2 for rejected input, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LedgerError>() {
        Some(ledger_err) if ledger_err.is_user_error() => 2,
        _ => 1,
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(Some(&cli.env))?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    let _guard = init_tracing(&config.logging)?;
    info!(env = %cli.env, db = %config.database.path.display(), "starting loom");

    let ledger = Ledger::with_busy_timeout(&config.database.path, config.database.busy_timeout())
        .with_context(|| format!("failed to open ledger at {}", config.database.path.display()))?;
    let session = Session {
        ledger,
        config,
        json: cli.json,
    };
    let result = dispatch(&session, cli.command);
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "command failed");
    }
    result
}

fn dispatch(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Company(cmd) => handle_company(session, cmd),
        Commands::Supplier(cmd) => handle_supplier(session, cmd),
        Commands::Customer(cmd) => handle_customer(session, cmd),
        Commands::Purchase(cmd) => handle_purchase(session, cmd),
        Commands::Sale(cmd) => handle_sale(session, cmd),
        Commands::Stock(cmd) => handle_stock(session, cmd),
        Commands::Report(cmd) => handle_report(session, cmd),
        Commands::Bank(cmd) => handle_bank(session, cmd),
        Commands::Db(cmd) => handle_db(session, cmd),
        Commands::Export(cmd) => handle_export(session, cmd),
    }
}

fn handle_company(session: &Session, command: CompanyCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        CompanyCommand::Add(args) => {
            let company = ledger.create_company(NewCompany {
                name: args.name,
                address: args.address,
                phone: args.phone,
                email: args.email,
                tax_number: args.tax_number,
                license_number: args.license_number,
                website: args.website,
            })?;
            session.emit(&company, |c| println!("Company {} registered: {}", c.id, c.name))
        }
        CompanyCommand::List => {
            let companies = ledger.companies()?;
            session.emit(&companies, |rows| {
                for c in rows {
                    println!("{:>4}  {:<30} tax# {}", c.id, c.name, opt(&c.tax_number));
                }
            })
        }
        CompanyCommand::Delete { id } => {
            ledger.delete_company(id)?;
            session.emit(&id, |id| println!("Company {id} deleted"))
        }
    }
}

fn handle_supplier(session: &Session, command: PartyCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        PartyCommand::Add { name, contact } => {
            let supplier = ledger.create_supplier(&name, contact)?;
            session.emit(&supplier, |s| println!("Supplier {} registered: {}", s.id, s.name))
        }
        PartyCommand::List => {
            let suppliers = ledger.suppliers()?;
            session.emit(&suppliers, |rows| {
                for s in rows {
                    println!("{:>4}  {:<30} {}", s.id, s.name, opt(&s.contact));
                }
            })
        }
        PartyCommand::Delete { id } => {
            let id = SupplierId(id);
            ledger.delete_supplier(id)?;
            session.emit(&id, |id| println!("Supplier {id} deleted"))
        }
    }
}

fn handle_customer(session: &Session, command: PartyCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        PartyCommand::Add { name, contact } => {
            let customer = ledger.create_customer(&name, contact)?;
            session.emit(&customer, |c| println!("Customer {} registered: {}", c.id, c.name))
        }
        PartyCommand::List => {
            let customers = ledger.customers()?;
            session.emit(&customers, |rows| {
                for c in rows {
                    println!("{:>4}  {:<30} {}", c.id, c.name, opt(&c.contact));
                }
            })
        }
        PartyCommand::Delete { id } => {
            let id = CustomerId(id);
            ledger.delete_customer(id)?;
            session.emit(&id, |id| println!("Customer {id} deleted"))
        }
    }
}

fn handle_purchase(session: &Session, command: PurchaseCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        PurchaseCommand::Record(args) => {
            let purchase = NewPurchase {
                supplier_id: args.supplier,
                fabric: args.fabric.identity(),
                quantity_meters: args.quantity,
                price_per_meter: args.price,
                payment_method: args.method,
                payment_status: args.status,
                amount_paid: args.amount_paid,
                payment_notes: args.notes,
                date: args.date.map(day_start),
            };
            let purchase = ledger.record_purchase(purchase)?;
            session.emit(&purchase, |p| {
                println!(
                    "Purchase {} recorded: {} x {}m @ {} = {} ({}, due {})",
                    p.id,
                    p.fabric,
                    p.quantity_meters,
                    p.price_per_meter,
                    p.total_cost,
                    p.payment_status,
                    p.amount_due
                )
            })
        }
        PurchaseCommand::Ledger(args) => {
            let report = ledger.purchase_ledger(&args.query())?;
            session.emit(&report, |r| {
                for e in &r.entries {
                    let p = &e.purchase;
                    println!(
                        "{:>5}  {}  {:<20} {:<30} {:>10}m {:>12} {}",
                        p.id,
                        p.date.format("%Y-%m-%d"),
                        e.supplier_name,
                        p.fabric.to_string(),
                        p.quantity_meters,
                        p.total_cost,
                        p.payment_status
                    );
                }
                println!(
                    "{} purchases, {}m, total {}",
                    r.count, r.total_quantity, r.total_amount
                );
            })
        }
        PurchaseCommand::Pending { supplier } => {
            let rows = ledger.pending_purchase_payments(supplier)?;
            session.emit(&rows, |rows| {
                for row in rows {
                    let p = &row.purchase;
                    println!(
                        "{:>5}  {}  {:<20} total {:>12} paid {:>12} due {:>12}",
                        p.id,
                        p.date.format("%Y-%m-%d"),
                        row.supplier_name,
                        p.total_cost,
                        p.amount_paid,
                        p.amount_due
                    );
                }
            })
        }
        PurchaseCommand::Pay(args) => {
            let id = PurchaseId(args.id);
            let receipt = ledger.record_purchase_payment(id, args.payment())?;
            session.emit(&receipt, |r| {
                println!(
                    "Payment {} of {} recorded on purchase {}: {} (due {})",
                    r.payment.id,
                    r.payment.amount,
                    id,
                    r.settlement.status,
                    r.settlement.amount_due
                )
            })
        }
        PurchaseCommand::Payments { id } => {
            let payments = ledger.payments_for_purchase(id)?;
            session.emit(&payments, |rows| {
                for p in rows {
                    println!(
                        "{:>5}  {}  {:>12} {:<8} {}",
                        p.id,
                        p.date.format("%Y-%m-%d"),
                        p.amount,
                        p.method,
                        opt(&p.reference)
                    );
                }
            })
        }
    }
}

fn handle_sale(session: &Session, command: SaleCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        SaleCommand::Record(args) => {
            let sales = &session.config.sales;
            let sale = NewSale {
                company_id: args.company,
                customer_id: args.customer,
                fabric: args.fabric.identity(),
                quantity_meters: args.quantity,
                price_per_meter: args.price,
                apply_tax: sales.apply_tax && !args.no_tax,
                tax_rate: args.tax_rate.unwrap_or(sales.default_tax_rate),
                payment_method: args.method,
                payment_status: args.status,
                amount_paid: args.amount_paid,
                payment_notes: args.notes,
                date: args.date.map(day_start),
            };
            let sale = ledger.record_sale(sale)?;
            session.emit(&sale, |s| {
                println!(
                    "Sale {} recorded: {} x {}m @ {}, tax {}, total {} ({}, due {})",
                    s.id,
                    s.fabric,
                    s.quantity_meters,
                    s.price_per_meter,
                    s.tax,
                    s.total_price_with_tax,
                    s.payment_status,
                    s.amount_due
                )
            })
        }
        SaleCommand::Ledger(args) => {
            let report = ledger.sale_ledger(&args.query())?;
            session.emit(&report, |r| {
                for e in &r.entries {
                    let s = &e.sale;
                    println!(
                        "{:>5}  {}  {:<20} {:<30} {:>10}m {:>12} {}",
                        s.id,
                        s.date.format("%Y-%m-%d"),
                        e.customer_name,
                        s.fabric.to_string(),
                        s.quantity_meters,
                        s.total_price_with_tax,
                        s.payment_status
                    );
                }
                println!(
                    "{} sales, {}m, subtotal {}, tax {}, total {}",
                    r.count, r.total_quantity, r.subtotal, r.total_tax, r.total_amount
                );
            })
        }
        SaleCommand::Pending { customer } => {
            let rows = ledger.pending_payments(customer)?;
            session.emit(&rows, |rows| {
                for row in rows {
                    let s = &row.sale;
                    println!(
                        "{:>5}  {}  {:<20} total {:>12} paid {:>12} due {:>12}",
                        s.id,
                        s.date.format("%Y-%m-%d"),
                        row.customer_name,
                        s.total_price_with_tax,
                        s.amount_paid,
                        s.amount_due
                    );
                }
            })
        }
        SaleCommand::Pay(args) => {
            let id = SaleId(args.id);
            let receipt = ledger.record_payment(id, args.payment())?;
            session.emit(&receipt, |r| {
                println!(
                    "Payment {} of {} recorded on sale {}: {} (due {})",
                    r.payment.id,
                    r.payment.amount,
                    id,
                    r.settlement.status,
                    r.settlement.amount_due
                )
            })
        }
        SaleCommand::Payments { id } => {
            let payments = ledger.payments_for_sale(id)?;
            session.emit(&payments, |rows| {
                for p in rows {
                    println!(
                        "{:>5}  {}  {:>12} {:<8} {}",
                        p.id,
                        p.date.format("%Y-%m-%d"),
                        p.amount,
                        p.method,
                        opt(&p.reference)
                    );
                }
            })
        }
    }
}

fn handle_stock(session: &Session, command: StockCommand) -> Result<()> {
    let ledger = &session.ledger;
    let lines = match command {
        StockCommand::Summary { search } => ledger.stock_summary(search.as_deref())?,
        StockCommand::Available => ledger.available_fabrics()?,
        StockCommand::Valuation => {
            let report = ledger.valuation_report()?;
            return session.emit(&report, |r| {
                for fabric in &r.fabrics {
                    println!("{}  valuation {}", fabric.fabric, fabric.total_valuation);
                    for lot in &fabric.lots {
                        println!(
                            "    lot {:>5} {}  {:>10}m @ {:>10} = {:>12}",
                            lot.purchase_id,
                            lot.date.format("%Y-%m-%d"),
                            lot.remaining,
                            lot.price_per_meter,
                            lot.value
                        );
                    }
                }
                println!("{}m in hand, valued at {}", r.total_meters, r.total_valuation);
            });
        }
    };
    session.emit(&lines, |lines| {
        for line in lines {
            let flag = if line.consistent { "" } else { "  (inconsistent)" };
            println!(
                "{:<36} bought {:>10} sold {:>10} balance {:>10} avg {:>10} value {:>12}{}",
                line.fabric.to_string(),
                line.total_purchased,
                line.total_sold,
                line.balance_in_meters,
                line.avg_cost_per_meter,
                line.stock_valuation,
                flag
            );
        }
    })
}

fn handle_report(session: &Session, command: ReportCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        ReportCommand::Profit => {
            let pl = ledger.profit_loss()?;
            session.emit(&pl, |pl| {
                println!("purchased cost  {}", pl.total_purchased_cost);
                println!("sales revenue   {}", pl.total_sales_revenue);
                println!("profit          {}", pl.profit);
            })
        }
        ReportCommand::Outstanding => {
            let totals = ledger.outstanding_totals()?;
            session.emit(&totals, |t| {
                println!("receivable  {}", t.receivable);
                println!("payable     {}", t.payable);
            })
        }
        ReportCommand::Credit { suppliers, window } => {
            if suppliers {
                let rows = ledger.supplier_credit_summary(window.range())?;
                session.emit(&rows, |rows| {
                    for r in rows {
                        println!(
                            "{:>4}  {:<30} open {:>3} due {:>12} of {:>12}",
                            r.supplier_id, r.supplier_name, r.pending_count, r.total_due, r.total_purchases
                        );
                    }
                })
            } else {
                let rows = ledger.customer_credit_summary(window.range())?;
                session.emit(&rows, |rows| {
                    for r in rows {
                        println!(
                            "{:>4}  {:<30} open {:>3} due {:>12} of {:>12}",
                            r.customer_id, r.customer_name, r.pending_count, r.total_due, r.total_sales
                        );
                    }
                })
            }
        }
        ReportCommand::LedgerSummary { suppliers, window } => {
            let rows = if suppliers {
                ledger.supplier_ledger_summary(window.range())?
            } else {
                ledger.customer_ledger_summary(window.range())?
            };
            session.emit(&rows, |rows| {
                for r in rows {
                    println!(
                        "{:>4}  {:<30} {:>4} txns {:>10}m {:>12}",
                        r.id, r.name, r.transaction_count, r.total_quantity, r.total_amount
                    );
                }
            })
        }
        ReportCommand::PaymentHistory {
            customer,
            supplier,
            suppliers,
            window,
        } => {
            if suppliers || supplier.is_some() {
                let rows = ledger.purchase_payment_history(supplier, window.range())?;
                session.emit(&rows, |rows| {
                    for r in rows {
                        println!(
                            "{}  {:<24} purchase {:>5} {:>12} {}",
                            r.payment.date.format("%Y-%m-%d"),
                            r.supplier_name,
                            r.payment.purchase_id,
                            r.payment.amount,
                            r.payment.method
                        );
                    }
                })
            } else {
                let rows = ledger.payment_history(customer, window.range())?;
                session.emit(&rows, |rows| {
                    for r in rows {
                        println!(
                            "{}  {:<24} sale {:>5} {:>12} {}",
                            r.payment.date.format("%Y-%m-%d"),
                            r.customer_name,
                            r.payment.sale_id,
                            r.payment.amount,
                            r.payment.method
                        );
                    }
                })
            }
        }
    }
}

fn print_statements(rows: &[BankStatement]) {
    for s in rows {
        println!(
            "{:>5}  {}  {:<6} {:>12} {:<8} {:<12} {}",
            s.id,
            s.date.format("%Y-%m-%d"),
            s.entry_type,
            s.amount,
            s.status,
            opt(&s.account),
            s.description
        );
    }
}

fn handle_bank(session: &Session, command: BankCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        BankCommand::Add(args) => {
            let entry = NewBankStatement {
                entry_type: args.entry_type,
                amount: args.amount,
                description: args.description,
                account: args.account,
                reference: args.reference,
                related_sale_id: args.sale,
                related_purchase_id: args.purchase,
                payment_method: args.method,
                status: args.status,
                recorded_by: args.recorded_by,
                date: args.date.map(day_start),
            };
            let statement = ledger.add_bank_statement(entry)?;
            session.emit(&statement, |s| {
                println!("Bank entry {} recorded: {} {} ({})", s.id, s.entry_type, s.amount, s.status)
            })
        }
        BankCommand::Update { id, status, notes } => {
            let statement = ledger.update_bank_statement(id, status, notes)?;
            session.emit(&statement, |s| println!("Bank entry {} is now {}", s.id, s.status))
        }
        BankCommand::List {
            entry_type,
            status,
            account,
            window,
        } => {
            let query = BankStatementQuery {
                entry_type,
                status,
                range: window.range(),
                account,
            };
            let rows = ledger.bank_statements(&query)?;
            session.emit(&rows, |rows| print_statements(rows))
        }
        BankCommand::Summary { account, window } => {
            let summary = ledger.bank_summary(window.range(), account.as_deref())?;
            session.emit(&summary, |s| {
                print_statements(&s.statements);
                println!("opening  {}", s.opening_balance);
                println!("credit   {}", s.total_credit);
                println!("debit    {}", s.total_debit);
                println!("closing  {}", s.closing_balance);
            })
        }
        BankCommand::Reconcile { window } => {
            let status = ledger.reconciliation_status(window.range())?;
            session.emit(&status, |s| {
                for tally in &s.tallies {
                    println!("{:<8} {:>4} entries {:>12}", tally.status, tally.count, tally.amount);
                }
                print_statements(&s.pending);
            })
        }
        BankCommand::Accounts => {
            let accounts = ledger.bank_accounts()?;
            session.emit(&accounts, |rows| {
                for account in rows {
                    println!("{account}");
                }
            })
        }
    }
}

fn handle_db(session: &Session, command: DbCommand) -> Result<()> {
    let ledger = &session.ledger;
    match command {
        DbCommand::Export { path } => {
            let bytes = ledger.export_database(&path)?;
            session.emit(&bytes, |bytes| {
                println!("Exported {} bytes to {}", bytes, path.display())
            })
        }
        DbCommand::Import { path } => {
            if path == ledger.path() {
                bail!("cannot import the database onto itself");
            }
            let backup = ledger.import_database(&path)?;
            session.emit(&backup, |backup| {
                println!(
                    "Imported {}; previous database kept at {}",
                    path.display(),
                    backup.display()
                )
            })
        }
    }
}

fn handle_export(session: &Session, command: ExportCommand) -> Result<()> {
    let ledger = &session.ledger;
    let (written, output) = match command {
        ExportCommand::Purchases { output, window } => {
            let report = ledger.purchase_ledger(&PurchaseLedgerQuery::default().with_range(window.range()))?;
            (export::write_purchases(&output, &report)?, output)
        }
        ExportCommand::Sales { output, window } => {
            let report = ledger.sale_ledger(&SaleLedgerQuery::default().with_range(window.range()))?;
            (export::write_sales(&output, &report)?, output)
        }
        ExportCommand::Stock { output } => {
            let lines = ledger.stock_summary(None)?;
            (export::write_stock(&output, &lines)?, output)
        }
        ExportCommand::Bank { output, window } => {
            let rows = ledger.bank_statements(&BankStatementQuery::default().with_range(window.range()))?;
            (export::write_bank(&output, &rows)?, output)
        }
    };
    info!(rows = written, output = %output.display(), "csv export written");
    session.emit(&written, |written| {
        println!("Wrote {} rows to {}", written, output.display())
    })
}
