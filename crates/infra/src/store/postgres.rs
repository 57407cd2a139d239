//! PostgreSQL backend.
//!
//! ## Tenant isolation
//!
//! Every statement filters on `shop_id`. Lookups by id that hit another
//! shop's row behave exactly like a miss.
//!
//! ## Transactions
//!
//! | Operation | Lock |
//! |-----------|------|
//! | `insert_*` | sequence row (`INSERT .. ON CONFLICT .. RETURNING`) |
//! | `apply_payment`, `update_invoice_status` | invoice row (`FOR UPDATE`) |
//! | `convert_estimate`, `update_estimate_status` | estimate row (`FOR UPDATE`) |
//! | `update_claim` | claim row (`FOR UPDATE`) |
//!
//! A transaction dropped on an early `?` return rolls back.
//!
//! ## Error mapping
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | unique violation (`23505`) | `Conflict` |
//! | anything else | `Backend` |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use tracing::{info, instrument};
use uuid::Uuid;

use repairdesk_core::{
    ClaimId, CustomerId, DocumentKind, EstimateId, InvoiceId, LineItem, Money, PaymentId, TenantId, TicketId,
};
use repairdesk_estimates::{Conversion, Estimate, EstimateDraft, EstimateStatusUpdate};
use repairdesk_invoicing::{ApplyPayment, Invoice, InvoiceDraft, InvoiceStatusUpdate, Payment, PaymentOutcome};
use repairdesk_tickets::{Customer, DeviceInfo, Ticket};
use repairdesk_warranty::{ClaimUpdate, FileClaim, RepairSnapshot, ResolutionType, WarrantyClaim};

use super::{
    ClaimFilter, Directory, EstimateFilter, EstimateStore, InvoiceFilter, InvoiceStore, StoreError,
    StoreResult, WarrantyStore,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        info!(max_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool })
    }

    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> StoreResult<()> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn conn(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    shop_id: Uuid,
    ticket_number: String,
    customer_id: Uuid,
    status: String,
    device: Json<DeviceInfo>,
    estimated_cost: Option<Decimal>,
    assigned_technician: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    repaired_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: TicketId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.shop_id),
            ticket_number: row.ticket_number,
            customer_id: CustomerId::from_uuid(row.customer_id),
            status: row.status,
            device: row.device.0,
            estimated_cost: row.estimated_cost.map(Money::new),
            assigned_technician: row.assigned_technician,
            notes: row.notes,
            created_at: row.created_at,
            repaired_at: row.repaired_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    owner_id: Uuid,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    total: Decimal,
}

impl From<ItemRow> for LineItem {
    fn from(row: ItemRow) -> Self {
        LineItem {
            description: row.description,
            quantity: row.quantity.normalize(),
            unit_price: Money::new(row.unit_price),
            total: Money::new(row.total),
        }
    }
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    shop_id: Uuid,
    invoice_number: String,
    customer_id: Uuid,
    ticket_id: Option<Uuid>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    discount: Decimal,
    total: Decimal,
    amount_paid: Decimal,
    amount_due: Decimal,
    status: String,
    notes: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, items: Vec<LineItem>) -> StoreResult<Invoice> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.shop_id),
            invoice_number: self.invoice_number,
            customer_id: CustomerId::from_uuid(self.customer_id),
            ticket_id: self.ticket_id.map(TicketId::from_uuid),
            items,
            subtotal: Money::new(self.subtotal),
            tax_rate: self.tax_rate.normalize(),
            tax_amount: Money::new(self.tax_amount),
            discount: Money::new(self.discount),
            total: Money::new(self.total),
            amount_paid: Money::new(self.amount_paid),
            amount_due: Money::new(self.amount_due),
            status: self.status.parse().map_err(corrupt_row)?,
            notes: self.notes,
            issued_at: self.issued_at,
            due_at: self.due_at,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    shop_id: Uuid,
    invoice_id: Uuid,
    amount: Decimal,
    method: String,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> StoreResult<Payment> {
        Ok(Payment {
            id: PaymentId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.shop_id),
            invoice_id: InvoiceId::from_uuid(self.invoice_id),
            amount: Money::new(self.amount),
            method: self.method.parse().map_err(corrupt_row)?,
            reference: self.reference,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EstimateRow {
    id: Uuid,
    shop_id: Uuid,
    estimate_number: String,
    customer_id: Uuid,
    device: Json<DeviceInfo>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    total: Decimal,
    status: String,
    valid_until: DateTime<Utc>,
    notes: Option<String>,
    decline_reason: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    converted_to_ticket_id: Option<Uuid>,
    converted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EstimateRow {
    fn into_estimate(self, items: Vec<LineItem>) -> StoreResult<Estimate> {
        Ok(Estimate {
            id: EstimateId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.shop_id),
            estimate_number: self.estimate_number,
            customer_id: CustomerId::from_uuid(self.customer_id),
            device: self.device.0,
            items,
            subtotal: Money::new(self.subtotal),
            tax_rate: self.tax_rate.normalize(),
            tax_amount: Money::new(self.tax_amount),
            total: Money::new(self.total),
            status: self.status.parse().map_err(corrupt_row)?,
            valid_until: self.valid_until,
            notes: self.notes,
            decline_reason: self.decline_reason,
            approved_at: self.approved_at,
            declined_at: self.declined_at,
            converted_to_ticket_id: self.converted_to_ticket_id.map(TicketId::from_uuid),
            converted_at: self.converted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ClaimRow {
    id: Uuid,
    shop_id: Uuid,
    claim_number: String,
    ticket_id: Uuid,
    invoice_id: Option<Uuid>,
    original_technician: Option<String>,
    original_amount: Option<Decimal>,
    original_repair_date: DateTime<Utc>,
    warranty_period_days: i64,
    warranty_expires: DateTime<Utc>,
    claim_reason: String,
    claim_description: Option<String>,
    status: String,
    resolution_type: Option<String>,
    resolution_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClaimRow {
    fn into_claim(self) -> StoreResult<WarrantyClaim> {
        Ok(WarrantyClaim {
            id: ClaimId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.shop_id),
            claim_number: self.claim_number,
            ticket_id: TicketId::from_uuid(self.ticket_id),
            invoice_id: self.invoice_id.map(InvoiceId::from_uuid),
            original_technician: self.original_technician,
            original_amount: self.original_amount.map(Money::new),
            original_repair_date: self.original_repair_date,
            warranty_period_days: self.warranty_period_days,
            warranty_expires: self.warranty_expires,
            claim_reason: self.claim_reason,
            claim_description: self.claim_description,
            status: self.status.parse().map_err(corrupt_row)?,
            resolution_type: self
                .resolution_type
                .map(|r| r.parse::<ResolutionType>())
                .transpose()
                .map_err(corrupt_row)?,
            resolution_notes: self.resolution_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

const TICKET_COLUMNS: &str = "t.id, t.shop_id, t.ticket_number, t.customer_id, t.status, t.device, \
     t.estimated_cost, t.assigned_technician, t.notes, t.created_at, t.repaired_at, t.completed_at";

const INVOICE_COLUMNS: &str = "id, shop_id, invoice_number, customer_id, ticket_id, subtotal, tax_rate, \
     tax_amount, discount, total, amount_paid, amount_due, status, notes, issued_at, due_at, paid_at, \
     created_at, updated_at";

const ESTIMATE_COLUMNS: &str = "id, shop_id, estimate_number, customer_id, device, subtotal, tax_rate, \
     tax_amount, total, status, valid_until, notes, decline_reason, approved_at, declined_at, \
     converted_to_ticket_id, converted_at, created_at, updated_at";

const CLAIM_COLUMNS: &str = "id, shop_id, claim_number, ticket_id, invoice_id, original_technician, \
     original_amount, original_repair_date, warranty_period_days, warranty_expires, claim_reason, \
     claim_description, status, resolution_type, resolution_notes, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lock {
    None,
    ForUpdate,
}

impl Lock {
    fn suffix(self) -> &'static str {
        match self {
            Lock::None => "",
            Lock::ForUpdate => " FOR UPDATE",
        }
    }
}

/// Bump the tenant's counter for `kind` and format the number.
async fn next_number(conn: &mut PgConnection, tenant_id: TenantId, kind: DocumentKind) -> StoreResult<String> {
    loop {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (shop_id, kind, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (shop_id, kind)
            DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(kind.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("next_number", e))?;

        let number = kind.format(seq as u64);
        if kind != DocumentKind::Ticket {
            return Ok(number);
        }

        // Tickets are also numbered by the ticket surface.
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tickets WHERE shop_id = $1 AND ticket_number = $2)",
        )
        .bind(tenant_id.as_uuid())
        .bind(&number)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("next_number", e))?;
        if !taken {
            return Ok(number);
        }
    }
}

async fn load_items(conn: &mut PgConnection, table: &str, owner_column: &str, owners: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<LineItem>>> {
    let sql = format!(
        "SELECT {owner_column} AS owner_id, description, quantity, unit_price, total \
         FROM {table} WHERE {owner_column} = ANY($1) ORDER BY {owner_column}, position"
    );
    let rows: Vec<ItemRow> = sqlx::query_as(&sql)
        .bind(owners)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

    let mut grouped: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
    for row in rows {
        grouped.entry(row.owner_id).or_default().push(row.into());
    }
    Ok(grouped)
}

async fn insert_items(
    conn: &mut PgConnection,
    table: &str,
    owner_column: &str,
    owner: Uuid,
    items: &[LineItem],
) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO {table} ({owner_column}, position, description, quantity, unit_price, total) \
         VALUES ($1, $2, $3, $4, $5, $6)"
    );
    for (position, item) in items.iter().enumerate() {
        sqlx::query(&sql)
            .bind(owner)
            .bind(position as i32)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price.amount())
            .bind(item.total.amount())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert_items", e))?;
    }
    Ok(())
}

async fn load_invoice(conn: &mut PgConnection, tenant_id: TenantId, invoice_id: InvoiceId, lock: Lock) -> StoreResult<Option<Invoice>> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE shop_id = $1 AND id = $2{}",
        lock.suffix()
    );
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(tenant_id.as_uuid())
        .bind(invoice_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_invoice", e))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut items = load_items(conn, "invoice_items", "invoice_id", &[row.id]).await?;
    let items = items.remove(&row.id).unwrap_or_default();
    row.into_invoice(items).map(Some)
}

async fn invoices_with_items(conn: &mut PgConnection, rows: Vec<InvoiceRow>) -> StoreResult<Vec<Invoice>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut items = load_items(conn, "invoice_items", "invoice_id", &ids).await?;
    rows.into_iter()
        .map(|row| {
            let lines = items.remove(&row.id).unwrap_or_default();
            row.into_invoice(lines)
        })
        .collect()
}

/// Write back the mutable part of an invoice. Items and totals are fixed.
async fn write_invoice_state(conn: &mut PgConnection, invoice: &Invoice) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE invoices
        SET amount_paid = $3,
            amount_due = $4,
            status = $5,
            notes = $6,
            issued_at = $7,
            paid_at = $8,
            updated_at = $9
        WHERE shop_id = $1 AND id = $2
        "#,
    )
    .bind(invoice.tenant_id.as_uuid())
    .bind(invoice.id.as_uuid())
    .bind(invoice.amount_paid.amount())
    .bind(invoice.amount_due.amount())
    .bind(invoice.status.as_str())
    .bind(&invoice.notes)
    .bind(invoice.issued_at)
    .bind(invoice.paid_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_invoice_state", e))?;
    Ok(())
}

async fn load_estimate(conn: &mut PgConnection, tenant_id: TenantId, estimate_id: EstimateId, lock: Lock) -> StoreResult<Option<Estimate>> {
    let sql = format!(
        "SELECT {ESTIMATE_COLUMNS} FROM estimates WHERE shop_id = $1 AND id = $2{}",
        lock.suffix()
    );
    let row: Option<EstimateRow> = sqlx::query_as(&sql)
        .bind(tenant_id.as_uuid())
        .bind(estimate_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_estimate", e))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut items = load_items(conn, "estimate_items", "estimate_id", &[row.id]).await?;
    let items = items.remove(&row.id).unwrap_or_default();
    row.into_estimate(items).map(Some)
}

async fn write_estimate_state(conn: &mut PgConnection, estimate: &Estimate) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE estimates
        SET status = $3,
            notes = $4,
            decline_reason = $5,
            approved_at = $6,
            declined_at = $7,
            converted_to_ticket_id = $8,
            converted_at = $9,
            updated_at = $10
        WHERE shop_id = $1 AND id = $2
        "#,
    )
    .bind(estimate.tenant_id.as_uuid())
    .bind(estimate.id.as_uuid())
    .bind(estimate.status.as_str())
    .bind(&estimate.notes)
    .bind(&estimate.decline_reason)
    .bind(estimate.approved_at)
    .bind(estimate.declined_at)
    .bind(estimate.converted_to_ticket_id.map(Uuid::from))
    .bind(estimate.converted_at)
    .bind(estimate.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_estimate_state", e))?;
    Ok(())
}

async fn insert_ticket(conn: &mut PgConnection, ticket: &Ticket) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tickets (
            id, shop_id, ticket_number, customer_id, status, device, estimated_cost,
            assigned_technician, notes, created_at, repaired_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            ticket_number = EXCLUDED.ticket_number,
            customer_id = EXCLUDED.customer_id,
            status = EXCLUDED.status,
            device = EXCLUDED.device,
            estimated_cost = EXCLUDED.estimated_cost,
            assigned_technician = EXCLUDED.assigned_technician,
            notes = EXCLUDED.notes,
            repaired_at = EXCLUDED.repaired_at,
            completed_at = EXCLUDED.completed_at
        WHERE tickets.shop_id = EXCLUDED.shop_id
        "#,
    )
    .bind(ticket.id.as_uuid())
    .bind(ticket.tenant_id.as_uuid())
    .bind(&ticket.ticket_number)
    .bind(ticket.customer_id.as_uuid())
    .bind(&ticket.status)
    .bind(Json(&ticket.device))
    .bind(ticket.estimated_cost.map(|m| m.amount()))
    .bind(&ticket.assigned_technician)
    .bind(&ticket.notes)
    .bind(ticket.created_at)
    .bind(ticket.repaired_at)
    .bind(ticket.completed_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_ticket", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait impls
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Directory for PostgresStore {
    #[instrument(skip(self, customer), fields(shop_id = %customer.tenant_id, customer_id = %customer.id), err)]
    async fn save_customer(&self, customer: Customer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, shop_id, name, phone, email)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email
            WHERE customers.shop_id = EXCLUDED.shop_id
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(customer.tenant_id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_customer", e))?;
        Ok(())
    }

    #[instrument(skip(self, ticket), fields(shop_id = %ticket.tenant_id, ticket_id = %ticket.id), err)]
    async fn save_ticket(&self, ticket: Ticket) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        insert_ticket(&mut conn, &ticket).await
    }

    async fn customer_exists(&self, tenant_id: TenantId, customer_id: CustomerId) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE shop_id = $1 AND id = $2)")
            .bind(tenant_id.as_uuid())
            .bind(customer_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("customer_exists", e))
    }

    async fn ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.shop_id = $1 AND t.id = $2");
        let row: Option<TicketRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ticket", e))?;
        Ok(row.map(Ticket::from))
    }

    async fn ticket_by_number(&self, tenant_id: TenantId, ticket_number: &str) -> StoreResult<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets t WHERE t.shop_id = $1 AND t.ticket_number = $2");
        let row: Option<TicketRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ticket_by_number", e))?;
        Ok(row.map(Ticket::from))
    }

    async fn latest_ticket_for_phone(&self, tenant_id: TenantId, digits: &str) -> StoreResult<Option<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets t \
             JOIN customers c ON c.id = t.customer_id AND c.shop_id = t.shop_id \
             WHERE t.shop_id = $1 \
               AND regexp_replace(COALESCE(c.phone, ''), '[^0-9]', '', 'g') LIKE '%' || $2 || '%' \
             ORDER BY t.created_at DESC \
             LIMIT 1"
        );
        let row: Option<TicketRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(digits)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("latest_ticket_for_phone", e))?;
        Ok(row.map(Ticket::from))
    }
}

#[async_trait]
impl InvoiceStore for PostgresStore {
    #[instrument(skip(self, draft), fields(shop_id = %draft.tenant_id()), err)]
    async fn insert_invoice(&self, draft: InvoiceDraft, now: DateTime<Utc>) -> StoreResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let number = next_number(&mut tx, draft.tenant_id(), DocumentKind::Invoice).await?;
        let invoice = draft.into_invoice(InvoiceId::new(), number, now);

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, shop_id, invoice_number, customer_id, ticket_id, subtotal, tax_rate, tax_amount,
                discount, total, amount_paid, amount_due, status, notes, issued_at, due_at, paid_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.tenant_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.customer_id.as_uuid())
        .bind(invoice.ticket_id.map(Uuid::from))
        .bind(invoice.subtotal.amount())
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount.amount())
        .bind(invoice.discount.amount())
        .bind(invoice.total.amount())
        .bind(invoice.amount_paid.amount())
        .bind(invoice.amount_due.amount())
        .bind(invoice.status.as_str())
        .bind(&invoice.notes)
        .bind(invoice.issued_at)
        .bind(invoice.due_at)
        .bind(invoice.paid_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        insert_items(&mut tx, "invoice_items", "invoice_id", invoice.id.into(), &invoice.items).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, "invoice inserted");
        Ok(invoice)
    }

    async fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Option<Invoice>> {
        let mut conn = self.conn().await?;
        load_invoice(&mut conn, tenant_id, invoice_id, Lock::None).await
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id), err)]
    async fn list_invoices(&self, tenant_id: TenantId, filter: InvoiceFilter) -> StoreResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE shop_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR customer_id = $3) \
             ORDER BY created_at DESC, invoice_number DESC"
        );
        let mut conn = self.conn().await?;
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.customer_id.map(Uuid::from))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_invoices", e))?;
        invoices_with_items(&mut conn, rows).await
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, invoice_id = %invoice_id), err)]
    async fn update_invoice_status(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        update: &InvoiceStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let mut invoice = load_invoice(&mut tx, tenant_id, invoice_id, Lock::ForUpdate)
            .await?
            .ok_or(StoreError::NotFound)?;
        invoice.update_status(update, now)?;
        write_invoice_state(&mut tx, &invoice).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(invoice)
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, invoice_id = %invoice_id), err)]
    async fn delete_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE shop_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(invoice_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, command), fields(shop_id = %tenant_id, invoice_id = %invoice_id, amount = %command.amount()), err)]
    async fn apply_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: &ApplyPayment,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        // Row lock: concurrent payments on this invoice queue here.
        let mut invoice = load_invoice(&mut tx, tenant_id, invoice_id, Lock::ForUpdate)
            .await?
            .ok_or(StoreError::NotFound)?;
        let (payment, outcome) = invoice.apply_payment(command, PaymentId::new(), now)?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, shop_id, invoice_id, amount, method, reference, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.tenant_id.as_uuid())
        .bind(payment.invoice_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(payment.method.as_str())
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;

        write_invoice_state(&mut tx, &invoice).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(outcome)
    }

    async fn payments(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, shop_id, invoice_id, amount, method, reference, notes, created_at
            FROM payments
            WHERE shop_id = $1 AND invoice_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("payments", e))?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn latest_invoice_for_ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE shop_id = $1 AND ticket_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let mut conn = self.conn().await?;
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(ticket_id.as_uuid())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("latest_invoice_for_ticket", e))?;
        Ok(invoices_with_items(&mut conn, rows).await?.into_iter().next())
    }
}

#[async_trait]
impl EstimateStore for PostgresStore {
    #[instrument(skip(self, draft), fields(shop_id = %draft.tenant_id()), err)]
    async fn insert_estimate(&self, draft: EstimateDraft, now: DateTime<Utc>) -> StoreResult<Estimate> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let number = next_number(&mut tx, draft.tenant_id(), DocumentKind::Estimate).await?;
        let estimate = draft.into_estimate(EstimateId::new(), number, now);

        sqlx::query(
            r#"
            INSERT INTO estimates (
                id, shop_id, estimate_number, customer_id, device, subtotal, tax_rate, tax_amount,
                total, status, valid_until, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(estimate.id.as_uuid())
        .bind(estimate.tenant_id.as_uuid())
        .bind(&estimate.estimate_number)
        .bind(estimate.customer_id.as_uuid())
        .bind(Json(&estimate.device))
        .bind(estimate.subtotal.amount())
        .bind(estimate.tax_rate)
        .bind(estimate.tax_amount.amount())
        .bind(estimate.total.amount())
        .bind(estimate.status.as_str())
        .bind(estimate.valid_until)
        .bind(&estimate.notes)
        .bind(estimate.created_at)
        .bind(estimate.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_estimate", e))?;

        insert_items(&mut tx, "estimate_items", "estimate_id", estimate.id.into(), &estimate.items).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        info!(estimate_id = %estimate.id, estimate_number = %estimate.estimate_number, "estimate inserted");
        Ok(estimate)
    }

    async fn estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<Option<Estimate>> {
        let mut conn = self.conn().await?;
        load_estimate(&mut conn, tenant_id, estimate_id, Lock::None).await
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id), err)]
    async fn list_estimates(&self, tenant_id: TenantId, filter: EstimateFilter) -> StoreResult<Vec<Estimate>> {
        let sql = format!(
            "SELECT {ESTIMATE_COLUMNS} FROM estimates \
             WHERE shop_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::uuid IS NULL OR customer_id = $3) \
             ORDER BY created_at DESC, estimate_number DESC"
        );
        let mut conn = self.conn().await?;
        let rows: Vec<EstimateRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.customer_id.map(Uuid::from))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_estimates", e))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&mut conn, "estimate_items", "estimate_id", &ids).await?;
        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_estimate(lines)
            })
            .collect()
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, estimate_id = %estimate_id), err)]
    async fn update_estimate_status(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        update: &EstimateStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Estimate> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let mut estimate = load_estimate(&mut tx, tenant_id, estimate_id, Lock::ForUpdate)
            .await?
            .ok_or(StoreError::NotFound)?;
        estimate.update_status(update, now)?;
        write_estimate_state(&mut tx, &estimate).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(estimate)
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, estimate_id = %estimate_id), err)]
    async fn delete_estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM estimates WHERE shop_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(estimate_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_estimate", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, estimate_id = %estimate_id), err)]
    async fn convert_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversion> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        // The row lock makes a concurrent second conversion see `converted`.
        let mut estimate = load_estimate(&mut tx, tenant_id, estimate_id, Lock::ForUpdate)
            .await?
            .ok_or(StoreError::NotFound)?;
        let new_ticket = estimate.conversion_ticket()?;

        let number = next_number(&mut tx, tenant_id, DocumentKind::Ticket).await?;
        let ticket = new_ticket.into_ticket(TicketId::new(), number, now);
        insert_ticket(&mut tx, &ticket).await?;

        estimate.mark_converted(ticket.id, now);
        write_estimate_state(&mut tx, &estimate).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Conversion {
            estimate_id,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number,
        })
    }
}

#[async_trait]
impl WarrantyStore for PostgresStore {
    #[instrument(skip(self, command, snapshot), fields(shop_id = %command.tenant_id, ticket_id = %snapshot.ticket_id), err)]
    async fn insert_claim(
        &self,
        command: FileClaim,
        snapshot: RepairSnapshot,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let number = next_number(&mut tx, command.tenant_id, DocumentKind::WarrantyClaim).await?;
        let claim = WarrantyClaim::file(command, snapshot, ClaimId::new(), number, now)?;

        sqlx::query(
            r#"
            INSERT INTO warranty_claims (
                id, shop_id, claim_number, ticket_id, invoice_id, original_technician, original_amount,
                original_repair_date, warranty_period_days, warranty_expires, claim_reason,
                claim_description, status, resolution_type, resolution_notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(claim.id.as_uuid())
        .bind(claim.tenant_id.as_uuid())
        .bind(&claim.claim_number)
        .bind(claim.ticket_id.as_uuid())
        .bind(claim.invoice_id.map(Uuid::from))
        .bind(&claim.original_technician)
        .bind(claim.original_amount.map(|m| m.amount()))
        .bind(claim.original_repair_date)
        .bind(claim.warranty_period_days)
        .bind(claim.warranty_expires)
        .bind(&claim.claim_reason)
        .bind(&claim.claim_description)
        .bind(claim.status.as_str())
        .bind(claim.resolution_type.map(|r| r.as_str()))
        .bind(&claim.resolution_notes)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_claim", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(claim)
    }

    async fn claim(&self, tenant_id: TenantId, claim_id: ClaimId) -> StoreResult<Option<WarrantyClaim>> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM warranty_claims WHERE shop_id = $1 AND id = $2");
        let row: Option<ClaimRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(claim_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim", e))?;
        row.map(ClaimRow::into_claim).transpose()
    }

    async fn list_claims(&self, tenant_id: TenantId, filter: ClaimFilter) -> StoreResult<Vec<WarrantyClaim>> {
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM warranty_claims \
             WHERE shop_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, claim_number DESC"
        );
        let rows: Vec<ClaimRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_claims", e))?;
        rows.into_iter().map(ClaimRow::into_claim).collect()
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, claim_id = %claim_id), err)]
    async fn update_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        update: &ClaimUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM warranty_claims WHERE shop_id = $1 AND id = $2 FOR UPDATE");
        let row: Option<ClaimRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_uuid())
            .bind(claim_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_claim", e))?;
        let mut claim = row.ok_or(StoreError::NotFound)?.into_claim()?;
        claim.apply_update(update, now)?;

        sqlx::query(
            r#"
            UPDATE warranty_claims
            SET status = $3, resolution_type = $4, resolution_notes = $5, updated_at = $6
            WHERE shop_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(claim_id.as_uuid())
        .bind(claim.status.as_str())
        .bind(claim.resolution_type.map(|r| r.as_str()))
        .bind(&claim.resolution_notes)
        .bind(claim.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_claim", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(claim)
    }
}

fn corrupt_row(err: repairdesk_core::DomainError) -> StoreError {
    StoreError::Backend(format!("unreadable row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict(format!(
            "duplicate value in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::Database(db_err) => {
            StoreError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
