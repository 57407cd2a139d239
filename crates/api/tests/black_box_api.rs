use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use repairdesk_auth::{JwtClaims, PrincipalId, Role};
use repairdesk_core::{CustomerId, Money, TenantId, TicketId};
use repairdesk_infra::store::{Directory, InMemoryStore};
use repairdesk_tickets::{Customer, DeviceInfo, Ticket};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, on an ephemeral port.
        let store = Arc::new(InMemoryStore::new());
        let app = repairdesk_api::app::build_app_with_store(JWT_SECRET, store.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, store, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn seed_customer(&self, tenant_id: TenantId, phone: &str) -> CustomerId {
        let id = CustomerId::new();
        self.store
            .save_customer(Customer {
                id,
                tenant_id,
                name: "Jordan Lee".to_string(),
                phone: Some(phone.to_string()),
                email: None,
            })
            .await
            .unwrap();
        id
    }

    async fn seed_completed_ticket(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        number: &str,
        completed_days_ago: i64,
    ) -> Ticket {
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::new(),
            tenant_id,
            ticket_number: number.to_string(),
            customer_id,
            status: "completed".to_string(),
            device: DeviceInfo {
                brand: Some("Acme".to_string()),
                model: Some("Phone 3".to_string()),
                ..DeviceInfo::default()
            },
            estimated_cost: Some(Money::from_major(75)),
            assigned_technician: Some("alex".to_string()),
            notes: None,
            created_at: now - ChronoDuration::days(completed_days_ago + 1),
            repaired_at: None,
            completed_at: Some(now - ChronoDuration::days(completed_days_ago)),
        };
        self.store.save_ticket(ticket.clone()).await.unwrap();
        ticket
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        shop_id: tenant_id,
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_scenario_a_invoice(client: &reqwest::Client, srv: &TestServer, token: &str, customer_id: CustomerId) -> Value {
    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(token)
        .json(&json!({
            "customerId": customer_id.to_string(),
            "items": [
                { "description": "Charging port", "quantity": 1, "unitPrice": 50 },
                { "description": "Labor", "quantity": 2, "unitPrice": 25 },
            ],
            "taxRate": 0.08,
            "discount": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn pay(client: &reqwest::Client, srv: &TestServer, token: &str, invoice_id: &str, amount: Value) -> (StatusCode, Value) {
    let res = client
        .post(srv.url(&format!("/invoices/{invoice_id}/payments")))
        .bearer_auth(token)
        .json(&json!({ "amount": amount, "method": "card" }))
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/invoices")).bearer_auth("garbage").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn shop_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, &["manager"]);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["shopId"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "manager"));
}

#[tokio::test]
async fn invoice_totals_full_payment_and_refund() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0100").await;
    let token = mint_jwt(tenant_id, &["owner"]);
    let client = reqwest::Client::new();

    // Scenario A
    let invoice = create_scenario_a_invoice(&client, &srv, &token, customer_id).await;
    assert_eq!(invoice["invoiceNumber"], "INV-00001");
    assert_eq!(invoice["subtotal"], "100.00");
    assert_eq!(invoice["taxAmount"], "8.00");
    assert_eq!(invoice["total"], "103.00");
    assert_eq!(invoice["amountDue"], "103.00");
    assert_eq!(invoice["status"], "DRAFT");
    let id = invoice["id"].as_str().unwrap().to_string();

    // Scenario B
    let (status, outcome) = pay(&client, &srv, &token, &id, json!(103)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(outcome["amountPaid"], "103.00");
    assert_eq!(outcome["amountDue"], "0.00");
    assert_eq!(outcome["status"], "PAID");

    // Scenario D
    let (_, outcome) = pay(&client, &srv, &token, &id, json!(-20)).await;
    assert_eq!(outcome["amountPaid"], "83.00");
    assert_eq!(outcome["amountDue"], "20.00");
    assert_eq!(outcome["status"], "PARTIAL");

    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["payments"].as_array().unwrap().len(), 2);
    assert_eq!(detail["amountPaid"], "83.00");
}

#[tokio::test]
async fn partial_then_remaining_payment() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0101").await;
    let token = mint_jwt(tenant_id, &["front_desk"]);
    let client = reqwest::Client::new();

    // Scenario C
    let invoice = create_scenario_a_invoice(&client, &srv, &token, customer_id).await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let (_, first) = pay(&client, &srv, &token, &id, json!("50")).await;
    assert_eq!(first["amountDue"], "53.00");
    assert_eq!(first["status"], "PARTIAL");

    let (_, second) = pay(&client, &srv, &token, &id, json!("53")).await;
    assert_eq!(second["amountDue"], "0.00");
    assert_eq!(second["status"], "PAID");
    assert_eq!(second["overpayment"], "0.00");

    let (status, _) = pay(&client, &srv, &token, &id, json!(0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn estimate_with_only_blank_items_is_rejected() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0102").await;
    let token = mint_jwt(tenant_id, &["technician"]);
    let client = reqwest::Client::new();

    // Scenario E
    let res = client
        .post(srv.url("/estimates"))
        .bearer_auth(&token)
        .json(&json!({
            "customerId": customer_id.to_string(),
            "items": [{ "description": "", "unitPrice": 10 }, { "description": "  ", "unitPrice": 5 }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client.get(srv.url("/estimates")).bearer_auth(&token).send().await.unwrap();
    let list: Value = res.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn estimate_converts_once() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0103").await;
    let token = mint_jwt(tenant_id, &["front_desk"]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/estimates"))
        .bearer_auth(&token)
        .json(&json!({
            "customerId": customer_id.to_string(),
            "deviceInfo": { "deviceType": "phone", "brand": "Acme" },
            "items": [{ "description": "Battery", "unitPrice": 40 }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let estimate: Value = res.json().await.unwrap();
    assert_eq!(estimate["estimateNumber"], "EST-00001");
    assert_eq!(estimate["total"], "43.30");
    let id = estimate["id"].as_str().unwrap().to_string();

    let res = client
        .patch(srv.url(&format!("/estimates/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "status": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let approved: Value = res.json().await.unwrap();
    assert!(approved["approvedAt"].is_string());

    let res = client
        .post(srv.url(&format!("/estimates/{id}/convert")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let conversion: Value = res.json().await.unwrap();
    assert_eq!(conversion["ticketNumber"], "TKT-00001");

    let res = client
        .post(srv.url(&format!("/estimates/{id}/convert")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(srv.url(&format!("/estimates/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let converted: Value = res.json().await.unwrap();
    assert_eq!(converted["status"], "converted");
    assert_eq!(converted["convertedToTicketId"], conversion["ticketId"]);
}

#[tokio::test]
async fn warranty_lookup_and_claims() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "(555) 010-4242").await;
    srv.seed_completed_ticket(tenant_id, customer_id, "TKT-00042", 91).await;
    let recent = srv.seed_completed_ticket(tenant_id, customer_id, "TKT-00043", 5).await;
    let token = mint_jwt(tenant_id, &["manager"]);
    let client = reqwest::Client::new();

    // Scenario F
    let res = client
        .get(srv.url("/warranty/lookup"))
        .query(&[("q", "TKT-00042")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["isActive"], false);
    assert_eq!(status["daysRemaining"], 0);
    assert_eq!(status["warrantyPeriodDays"], 90);

    let res = client
        .get(srv.url("/warranty/lookup"))
        .query(&[("q", "5550104242")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["ticketId"], recent.id.to_string());
    assert_eq!(status["isActive"], true);

    let res = client
        .get(srv.url("/warranty/lookup"))
        .query(&[("q", "TKT-99999")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/warranty/claims"))
        .bearer_auth(&token)
        .json(&json!({
            "ticketNumber": "TKT-00043",
            "claimReason": "screen flickers",
            "resolutionType": "redo",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let claim: Value = res.json().await.unwrap();
    assert_eq!(claim["claimNumber"], "WC-00001");
    assert_eq!(claim["status"], "pending");
    assert_eq!(claim["originalTechnician"], "alex");
    assert_eq!(claim["originalAmount"], "75.00");
    let claim_id = claim["id"].as_str().unwrap().to_string();

    let res = client
        .patch(srv.url(&format!("/warranty/claims/{claim_id}")))
        .bearer_auth(&token)
        .json(&json!({ "status": "approved", "resolutionNotes": "reseated connector" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated["status"], "approved");
    assert_eq!(updated["originalAmount"], "75.00");
}

#[tokio::test]
async fn other_shops_cannot_see_or_pay_invoices() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0104").await;
    let owner = mint_jwt(tenant_id, &["owner"]);
    let stranger = mint_jwt(TenantId::new(), &["owner"]);
    let client = reqwest::Client::new();

    let invoice = create_scenario_a_invoice(&client, &srv, &owner, customer_id).await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let (status, _) = pay(&client, &srv, &stranger, &id, json!(10)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let res = client
        .delete(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url("/invoices")).bearer_auth(&stranger).send().await.unwrap();
    let list: Value = res.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn roles_gate_destructive_operations() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0105").await;
    let owner = mint_jwt(tenant_id, &["owner"]);
    let technician = mint_jwt(tenant_id, &["technician"]);
    let client = reqwest::Client::new();

    let invoice = create_scenario_a_invoice(&client, &srv, &owner, customer_id).await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, _) = pay(&client, &srv, &technician, &id, json!(10)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&technician)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["owner"]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/invoices/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_range_amounts_are_rejected_and_the_store_keeps_serving() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let customer_id = srv.seed_customer(tenant_id, "555-0199").await;
    let token = mint_jwt(tenant_id, &["owner"]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(&token)
        .json(&json!({
            "customerId": customer_id.to_string(),
            "items": [{ "description": "Bulk", "quantity": "100000000000000000000", "unitPrice": "100000000000000000000" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let invoice = create_scenario_a_invoice(&client, &srv, &token, customer_id).await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, _) = pay(&client, &srv, &token, &id, json!("50000000000000000000000000000")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = pay(&client, &srv, &token, &id, json!("999999999999.99")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = pay(&client, &srv, &token, &id, json!("999999999999.99")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = client.get(srv.url("/invoices")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url(&format!("/invoices/{id}/payments")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let payments: Value = res.json().await.unwrap();
    assert_eq!(payments.as_array().unwrap().len(), 1);
}
