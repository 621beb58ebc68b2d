//! Browser-based OAuth authorization flow.
//!
//! Spins up a loopback HTTP server for the redirect, opens the
//! authorization page in a browser, and trades the returned code for a
//! token pair which is persisted to the config file.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::oneshot;

use ticktick_api::OAuthClient;
use ticktick_core::config::Config;
use ticktick_core::{Error, Result};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Callback query parameters.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// State shared with the callback handler.
struct CallbackState {
    expected_state: String,
    tx: Option<oneshot::Sender<std::result::Result<String, String>>>,
}

/// Generate a random state string (32 characters).
fn generate_state() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Find an available port for the callback server.
fn find_available_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Open URL in default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn()?;
    }
    Ok(())
}

fn success_page() -> Html<String> {
    Html(
        "<html><body><h2>Authorization complete</h2>\
         <p>You can close this tab and return to the terminal.</p></body></html>"
            .to_string(),
    )
}

fn error_page(message: &str) -> Html<String> {
    Html(format!(
        "<html><body><h2>Authorization failed</h2><p>{}</p></body></html>",
        message
    ))
}

/// Callback handler for the OAuth redirect.
async fn handle_callback(
    Query(params): Query<CallbackParams>,
    State(state): State<Arc<tokio::sync::Mutex<CallbackState>>>,
) -> Html<String> {
    let mut state = state.lock().await;

    if let Some(error) = params.error {
        let msg = params.error_description.unwrap_or(error);
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(Err(msg.clone()));
        }
        return error_page(&msg);
    }

    match &params.state {
        Some(received) if *received == state.expected_state => {}
        Some(_) => {
            if let Some(tx) = state.tx.take() {
                let _ = tx.send(Err("Invalid state parameter".to_string()));
            }
            return error_page("Invalid state parameter");
        }
        None => {
            if let Some(tx) = state.tx.take() {
                let _ = tx.send(Err("Missing state parameter".to_string()));
            }
            return error_page("Missing state parameter");
        }
    }

    if let Some(code) = params.code {
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(Ok(code));
        }
        success_page()
    } else {
        if let Some(tx) = state.tx.take() {
            let _ = tx.send(Err("Missing authorization code".to_string()));
        }
        error_page("Missing authorization code")
    }
}

/// Run the authorization flow and persist the resulting tokens.
pub async fn login(mut config: Config) -> Result<()> {
    let oauth = OAuthClient::from_config(&config)?;

    let port = find_available_port()
        .map_err(|e| Error::Auth(format!("Could not allocate a callback port: {}", e)))?;
    let state_param = generate_state();

    let (tx, rx) = oneshot::channel();
    let callback_state = Arc::new(tokio::sync::Mutex::new(CallbackState {
        expected_state: state_param.clone(),
        tx: Some(tx),
    }));

    let app = Router::new()
        .route("/callback", get(handle_callback))
        .with_state(callback_state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| Error::Auth(format!("Could not bind callback server: {}", e)))?;

    let redirect_uri = format!("http://localhost:{}/callback", port);
    let auth_url = oauth.authorize_url(&redirect_uri, &state_param);

    println!("Opening browser for authorization...");
    println!("If the browser doesn't open, visit:\n\n  {}\n", auth_url);

    if let Err(e) = open_browser(&auth_url) {
        eprintln!("Warning: failed to open browser: {}", e);
        println!("Please open the URL above manually.");
    }

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    println!("Waiting for authorization in the browser...");

    let code = tokio::select! {
        result = rx => {
            result.map_err(|_| Error::Auth("Callback channel closed unexpectedly".to_string()))?
        }
        _ = tokio::time::sleep(LOGIN_TIMEOUT) => {
            server.abort();
            return Err(Error::Auth("Authorization timed out after 5 minutes".to_string()));
        }
    };

    server.abort();

    let code = code.map_err(Error::Auth)?;
    println!("Authorization callback received, exchanging code for tokens...");

    let token = oauth.exchange_code(&code, &redirect_uri).await?;

    config.oauth.access_token = Some(token.access_token);
    config.oauth.refresh_token = token.refresh_token;
    config.save()?;

    println!(
        "Authorization successful. Tokens saved to {}",
        Config::config_path()?.display()
    );
    Ok(())
}
