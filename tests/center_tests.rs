// tests/center_tests.rs

//! Center gateway and reconciliation: operator login, offline candidate
//! flow, paper unlock, the student panel and sync-to-main semantics.

use examsync::{
    config::Config,
    routes,
    state::{AppState, Connectivity, PaperCache},
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

const JWT_SECRET: &str = "test_secret_for_integration_tests";
const OPERATOR_PASSWORD: &str = "a long operator secret";
const PAPER_PASSPHRASE: &str = "correct horse battery";

struct TestApp {
    address: String,
    pool: SqlitePool,
    client: reqwest::Client,
    admin_token: String,
}

/// Spawns the app on a random port over a fresh in-memory SQLite pool.
async fn spawn_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration_secs: 600,
        rust_log: "error".to_string(),
        heartbeat_alert_secs: 120,
        janitor_interval_secs: 300,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        papers: PaperCache::default(),
        central: Connectivity::default(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let admin_token = sign_jwt(1, "admin", None, JWT_SECRET, 600).unwrap();

    TestApp {
        address,
        pool,
        client: reqwest::Client::new(),
        admin_token,
    }
}

/// A provisioned exam with one center, its operator logged in.
struct Fixture {
    exam_id: i64,
    paper_id: i64,
    operator_token: String,
}

impl TestApp {
    async fn admin_post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(&self.admin_token)
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    async fn center_post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/center-admin{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    async fn candidate_id(&self, exam_id: i64, roll: &str) -> i64 {
        sqlx::query_scalar("SELECT id FROM candidates WHERE exam_id = ? AND roll_number = ?")
            .bind(exam_id)
            .bind(roll)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// Exam + roster + sealed paper + READY package + center link with a
    /// logged-in operator.
    async fn provision(&self, rolls: &[&str], max_usage: Option<i64>) -> Fixture {
        let response = self
            .admin_post(
                "/api/admin/exams",
                json!({
                    "exam_code": format!("EXM-{}", Uuid::new_v4()),
                    "title": "Combined Graduate Level, Tier I",
                    "single_device_login": true,
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let exam_id = response.json::<Value>().await.unwrap()["id"]
            .as_i64()
            .unwrap();

        let candidates: Vec<Value> = rolls
            .iter()
            .map(|r| json!({"roll_number": r, "full_name": format!("Candidate {}", r)}))
            .collect();
        let response = self
            .admin_post(
                &format!("/api/admin/exams/{}/candidates", exam_id),
                json!({ "candidates": candidates }),
            )
            .await;
        assert_eq!(response.status(), 201);

        let response = self
            .admin_post(
                "/api/admin/papers",
                json!({
                    "exam_id": exam_id,
                    "paper_code": format!("SETA-{}", Uuid::new_v4()),
                    "passphrase": PAPER_PASSPHRASE,
                    "questions": [
                        {"id": 1, "type": "single", "content": "2 + 2 = ?",
                         "options": ["3", "4", "5"], "answer": "4", "marks": 1},
                        {"id": 2, "type": "single",
                         "content": "Which article guarantees equality before law?",
                         "options": ["Article 12", "Article 14"], "answer": "Article 14", "marks": 2}
                    ],
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let paper_id = response.json::<Value>().await.unwrap()["id"]
            .as_i64()
            .unwrap();

        let response = self
            .admin_post("/api/admin/packages", json!({ "exam_id": exam_id }))
            .await;
        assert_eq!(response.status(), 201);

        let response = self
            .admin_post(
                "/api/admin/center-links",
                json!({
                    "exam_id": exam_id,
                    "center_code": "DL-091",
                    "center_name": "Kendriya Vidyalaya, Dwarka",
                    "max_usage": max_usage,
                    "operator_username": "invigilator",
                    "operator_password": OPERATOR_PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.status(), 201);

        let response = self
            .client
            .post(format!("{}/api/center-admin/login", self.address))
            .json(&json!({
                "center_code": "DL-091",
                "username": "invigilator",
                "password": OPERATOR_PASSWORD,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let operator_token = response.json::<Value>().await.unwrap()["token"]
            .as_str()
            .unwrap()
            .to_string();

        Fixture {
            exam_id,
            paper_id,
            operator_token,
        }
    }

    async fn set_connectivity(&self, operator_token: &str, online: bool) {
        let response = self
            .client
            .put(format!("{}/api/center-admin/connectivity", self.address))
            .bearer_auth(operator_token)
            .json(&json!({ "online": online }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    async fn student_login(&self, operator_token: &str, candidate_id: i64, roll: &str) -> reqwest::Response {
        self.center_post(
            operator_token,
            "/student-login",
            json!({
                "candidate_id": candidate_id,
                "roll_number": roll,
                "seat_number": "A-12",
                "computer_number": "PC-07",
            }),
        )
        .await
    }

    async fn save_responses(&self, session_token: &str, responses: Value) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/api/student-exam/{}/save-response",
                self.address, session_token
            ))
            .json(&json!({ "responses": responses }))
            .send()
            .await
            .unwrap()
    }

    async fn submit(&self, session_token: &str) -> reqwest::Response {
        self.client
            .post(format!(
                "{}/api/student-exam/{}/submit",
                self.address, session_token
            ))
            .json(&json!({ "responses": [], "total_questions": 2 }))
            .send()
            .await
            .unwrap()
    }

    async fn sync_to_main(&self, operator_token: &str) -> reqwest::Response {
        self.center_post(operator_token, "/sync-to-main", json!({})).await
    }
}

async fn error_code(response: reqwest::Response) -> String {
    response.json::<Value>().await.unwrap()["code"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_operator_login_rejects_bad_credentials() {
    let app = spawn_app().await;
    let _fixture = app.provision(&["R-001"], None).await;

    let response = app
        .client
        .post(format!("{}/api/center-admin/login", app.address))
        .json(&json!({
            "center_code": "DL-091",
            "username": "invigilator",
            "password": "not the password",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = app
        .client
        .post(format!("{}/api/center-admin/login", app.address))
        .json(&json!({
            "center_code": "XX-000",
            "username": "invigilator",
            "password": OPERATOR_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_center_routes_reject_non_operator_tokens() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    // no token
    let response = app
        .client
        .post(format!("{}/api/center-admin/student-login", app.address))
        .json(&json!({ "candidate_id": c1, "roll_number": "R-001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // admin token lacks center scope
    let response = app
        .client
        .post(format!("{}/api/center-admin/student-login", app.address))
        .bearer_auth(&app.admin_token)
        .json(&json!({ "candidate_id": c1, "roll_number": "R-001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_online_student_login_registers_centrally() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    assert_eq!(response.status(), 201);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["central_registered"], true);
    assert_eq!(body["session"]["status"], "WAITING");
    let session_token = body["session"]["session_token"].as_str().unwrap();

    // the central record shares the token and is ACTIVE
    let status: String =
        sqlx::query_scalar("SELECT status FROM exam_sessions WHERE session_token = ?")
            .bind(session_token)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "ACTIVE");

    // a second seat for the same candidate is refused
    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    assert_eq!(response.status(), 409);
    assert_eq!(error_code(response).await, "DUPLICATE_SESSION");
}

#[tokio::test]
async fn test_online_login_surfaces_central_duplicate() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    // candidate already active through another center's lockdown client
    let (_, other_token): (i64, String) = {
        let response = app
            .admin_post(
                "/api/admin/center-links",
                json!({
                    "exam_id": fixture.exam_id,
                    "center_code": "MH-204",
                    "center_name": "Other Lab",
                    "operator_username": "invigilator",
                    "operator_password": OPERATOR_PASSWORD,
                }),
            )
            .await;
        let body = response.json::<Value>().await.unwrap();
        (
            body["link"]["id"].as_i64().unwrap(),
            body["access_token"].as_str().unwrap().to_string(),
        )
    };
    let response = app
        .client
        .post(format!("{}/api/secure-exam/start-session", app.address))
        .json(&json!({
            "access_token": other_token,
            "candidate_id": c1,
            "roll_number": "R-001",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    assert_eq!(response.status(), 409);
    assert_eq!(error_code(response).await, "DUPLICATE_SESSION");
}

#[tokio::test]
async fn test_unlock_paper_and_stripped_questions() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    // questions are not served while the paper is sealed
    let response = app
        .client
        .get(format!(
            "{}/api/student-exam/{}/questions",
            app.address, session_token
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(error_code(response).await, "PACKAGE_NOT_READY");

    // wrong passphrase
    let response = app
        .center_post(
            &fixture.operator_token,
            "/unlock-paper",
            json!({ "paper_id": fixture.paper_id, "passphrase": "wrong passphrase" }),
        )
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(error_code(response).await, "DECRYPTION_FAILED");

    let response = app
        .center_post(
            &fixture.operator_token,
            "/unlock-paper",
            json!({ "paper_id": fixture.paper_id, "passphrase": PAPER_PASSPHRASE }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap()["questions"], 2);

    let response = app
        .client
        .get(format!(
            "{}/api/student-exam/{}/questions",
            app.address, session_token
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.json::<Value>().await.unwrap();
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    for q in questions {
        assert!(q.get("answer").is_none());
        assert!(q["content"].is_string());
    }

    // first fetch started the sitting
    let status: String =
        sqlx::query_scalar("SELECT status FROM local_student_sessions WHERE session_token = ?")
            .bind(&session_token)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "IN_PROGRESS");
}

#[tokio::test]
async fn test_admin_decrypt_roundtrip() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;

    let response = app
        .admin_post(
            &format!("/api/admin/papers/{}/decrypt", fixture.paper_id),
            json!({ "passphrase": PAPER_PASSPHRASE }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let questions = response.json::<Vec<Value>>().await.unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0]["answer"], "4");

    let response = app
        .admin_post(
            &format!("/api/admin/papers/{}/decrypt", fixture.paper_id),
            json!({ "passphrase": "guessed passphrase" }),
        )
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(error_code(response).await, "DECRYPTION_FAILED");
}

#[tokio::test]
async fn test_offline_responses_sync_and_idempotence() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    app.set_connectivity(&fixture.operator_token, false).await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    assert_eq!(response.status(), 201);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["central_registered"], false);
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    // five answers recorded locally while the WAN is down
    let responses: Vec<Value> = (1..=5)
        .map(|q| json!({"question_id": q, "selected_answer": "A", "time_taken_secs": 30}))
        .collect();
    let response = app.save_responses(&session_token, json!(responses)).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap()["saved"], 5);

    // a re-save overwrites in place
    let response = app
        .save_responses(
            &session_token,
            json!([{"question_id": 3, "selected_answer": "B", "time_taken_secs": 55}]),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app.submit(&session_token).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap()["status"], "SUBMITTED");

    // syncing needs the WAN back
    let response = app.sync_to_main(&fixture.operator_token).await;
    assert_eq!(response.status(), 400);

    app.set_connectivity(&fixture.operator_token, true).await;

    let response = app.sync_to_main(&fixture.operator_token).await;
    assert_eq!(response.status(), 200);
    let outcome = response.json::<Value>().await.unwrap();
    assert_eq!(outcome["uploaded"], 5);
    assert_eq!(outcome["failed"], 0);
    assert_eq!(outcome["log"]["status"], "COMPLETED");

    // deferred registration created the central record in its terminal state
    let status: String =
        sqlx::query_scalar("SELECT status FROM exam_sessions WHERE session_token = ?")
            .bind(&session_token)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, "COMPLETED");

    let answer: String = sqlx::query_scalar(
        "SELECT selected_answer FROM central_responses WHERE exam_id = ? AND candidate_id = ? AND question_id = 3",
    )
    .bind(fixture.exam_id)
    .bind(c1)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(answer, "B");

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM central_responses WHERE exam_id = ? AND candidate_id = ?",
    )
    .bind(fixture.exam_id)
    .bind(c1)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(total, 5);

    // an immediate re-run has nothing to do
    let response = app.sync_to_main(&fixture.operator_token).await;
    assert_eq!(response.status(), 200);
    let outcome = response.json::<Value>().await.unwrap();
    assert_eq!(outcome["uploaded"], 0);
    assert_eq!(outcome["failed"], 0);

    let total_after: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM central_responses WHERE exam_id = ? AND candidate_id = ?",
    )
    .bind(fixture.exam_id)
    .bind(c1)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(total_after, 5);
}

#[tokio::test]
async fn test_closed_local_session_rejects_further_writes() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.submit(&session_token).await;
    assert_eq!(response.status(), 200);

    let response = app.submit(&session_token).await;
    assert_eq!(response.status(), 409);
    assert_eq!(error_code(response).await, "SESSION_ALREADY_CLOSED");

    let response = app
        .save_responses(
            &session_token,
            json!([{"question_id": 1, "selected_answer": "A"}]),
        )
        .await;
    assert_eq!(response.status(), 409);
    assert_eq!(error_code(response).await, "SESSION_NOT_ACTIVE");
}

#[tokio::test]
async fn test_operator_termination_syncs_to_central() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .center_post(
            &fixture.operator_token,
            "/terminate-student",
            json!({ "session_token": session_token, "reason": "caught with notes" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap()["status"], "TERMINATED");

    // identical repeat is a no-op success
    let response = app
        .center_post(
            &fixture.operator_token,
            "/terminate-student",
            json!({ "session_token": session_token, "reason": "caught with notes" }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app.sync_to_main(&fixture.operator_token).await;
    assert_eq!(response.status(), 200);

    let (status, reason): (String, Option<String>) = sqlx::query_as(
        "SELECT status, termination_reason FROM exam_sessions WHERE session_token = ?",
    )
    .bind(&session_token)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(status, "TERMINATED");
    assert_eq!(reason.as_deref(), Some("caught with notes"));
}

#[tokio::test]
async fn test_sync_counts_per_session_failures() {
    // Two candidates sat offline, but the link only had one usage slot.
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001", "R-002"], Some(1)).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;
    let c2 = app.candidate_id(fixture.exam_id, "R-002").await;

    app.set_connectivity(&fixture.operator_token, false).await;

    for (candidate, roll) in [(c1, "R-001"), (c2, "R-002")] {
        let response = app.student_login(&fixture.operator_token, candidate, roll).await;
        assert_eq!(response.status(), 201);
        let body = response.json::<Value>().await.unwrap();
        let session_token = body["session"]["session_token"]
            .as_str()
            .unwrap()
            .to_string();
        app.save_responses(
            &session_token,
            json!([{"question_id": 1, "selected_answer": "A"}]),
        )
        .await;
        let response = app.submit(&session_token).await;
        assert_eq!(response.status(), 200);
    }

    app.set_connectivity(&fixture.operator_token, true).await;

    let response = app.sync_to_main(&fixture.operator_token).await;
    assert_eq!(response.status(), 200);
    let outcome = response.json::<Value>().await.unwrap();
    // one session merged, the other refused on the spent cap
    assert_eq!(outcome["uploaded"], 1);
    assert_eq!(outcome["failed"], 1);
    assert_eq!(outcome["log"]["status"], "COMPLETED");

    let merged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM local_student_sessions WHERE exam_id = ? AND synced_to_main = 1",
    )
    .bind(fixture.exam_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(merged, 1);

    // the failed session stays pending for a retry after the cap is raised
    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM local_student_sessions WHERE exam_id = ? AND synced_to_main = 0",
    )
    .bind(fixture.exam_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(pending, 1);

    // usage never exceeded the cap
    let usage: i64 = sqlx::query_scalar(
        "SELECT usage_count FROM center_links WHERE exam_id = ? AND center_code = 'DL-091'",
    )
    .bind(fixture.exam_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(usage, 1);
}

#[tokio::test]
async fn test_sync_log_audit_trail() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();
    app.submit(&session_token).await;

    app.sync_to_main(&fixture.operator_token).await;
    app.sync_to_main(&fixture.operator_token).await;

    let response = app
        .client
        .get(format!(
            "{}/api/admin/sync-logs?exam_id={}",
            app.address, fixture.exam_id
        ))
        .bearer_auth(&app.admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let logs = response.json::<Vec<Value>>().await.unwrap();
    // one row per attempt, newest first, all closed
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["records_uploaded"], 0);
    for log in &logs {
        assert_eq!(log["status"], "COMPLETED");
        assert!(log["completed_at"].is_string());
    }
}

#[tokio::test]
async fn test_local_sessions_listing() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001", "R-002"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();
    app.save_responses(
        &session_token,
        json!([
            {"question_id": 1, "selected_answer": "A"},
            {"question_id": 2, "selected_answer": "B"}
        ]),
    )
    .await;

    let response = app
        .client
        .get(format!("{}/api/center-admin/local-sessions", app.address))
        .bearer_auth(&fixture.operator_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let sessions = response.json::<Vec<Value>>().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["responses"], 2);
    assert_eq!(sessions[0]["synced_to_main"], false);
}

#[tokio::test]
async fn test_roster_gate_on_student_login() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    // unknown candidate id
    let response = app.student_login(&fixture.operator_token, c1 + 999, "R-999").await;
    assert_eq!(response.status(), 404);

    // roll number mismatch
    let response = app.student_login(&fixture.operator_token, c1, "R-002").await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_operator_login_when_center_serves_two_exams() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;

    // the same physical center gets a link for a second exam
    let response = app
        .admin_post(
            "/api/admin/exams",
            json!({
                "exam_code": format!("EXM-{}", Uuid::new_v4()),
                "title": "Junior Engineer, Paper II",
                "single_device_login": true,
            }),
        )
        .await;
    let second_exam = response.json::<Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();
    let response = app
        .admin_post(
            "/api/admin/center-links",
            json!({
                "exam_id": second_exam,
                "center_code": "DL-091",
                "center_name": "Kendriya Vidyalaya, Dwarka",
                "operator_username": "invigilator_je",
                "operator_password": OPERATOR_PASSWORD,
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    // the first exam's operator still logs in, scoped to their own link
    let response = app
        .client
        .post(format!("{}/api/center-admin/login", app.address))
        .json(&json!({
            "center_code": "DL-091",
            "username": "invigilator",
            "password": OPERATOR_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["exam_id"], fixture.exam_id);

    // and so does the second exam's
    let response = app
        .client
        .post(format!("{}/api/center-admin/login", app.address))
        .json(&json!({
            "center_code": "DL-091",
            "username": "invigilator_je",
            "password": OPERATOR_PASSWORD,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["exam_id"], second_exam);
}

#[tokio::test]
async fn test_concurrent_offline_seats_admit_candidate_once() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    app.set_connectivity(&fixture.operator_token, false).await;

    // two operator consoles seat the same candidate at once
    let (first, second) = tokio::join!(
        app.student_login(&fixture.operator_token, c1, "R-001"),
        app.student_login(&fixture.operator_token, c1, "R-001"),
    );
    let statuses = [first.status().as_u16(), second.status().as_u16()];
    assert!(statuses.contains(&201), "statuses: {:?}", statuses);
    assert!(statuses.contains(&409), "statuses: {:?}", statuses);

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM local_student_sessions WHERE candidate_id = ? AND status IN ('WAITING', 'IN_PROGRESS')",
    )
    .bind(c1)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn test_save_batch_rejects_empty_payload() {
    let app = spawn_app().await;
    let fixture = app.provision(&["R-001"], None).await;
    let c1 = app.candidate_id(fixture.exam_id, "R-001").await;

    let response = app.student_login(&fixture.operator_token, c1, "R-001").await;
    let body = response.json::<Value>().await.unwrap();
    let session_token = body["session"]["session_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app.save_responses(&session_token, json!([])).await;
    assert_eq!(response.status(), 400);
}
