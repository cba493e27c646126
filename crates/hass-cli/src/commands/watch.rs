//! Live event stream

use anyhow::Result;

use hass_client::HassApi;

use crate::output::{format_event, print_info, print_warning};

/// Print events until Ctrl-C or until the connection is lost
pub async fn watch_command(api: &HassApi, event_type: Option<&str>) -> Result<()> {
    let client = api.client();
    let (subscription, mut events) = client.subscribe_channel(event_type).await?;

    print_info(&format!(
        "Watching {} events (Ctrl-C to stop)",
        event_type.unwrap_or("all")
    ));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => println!("{}", format_event(&event)),
                    None => {
                        // Registry dropped the subscription: the connection went away
                        print_warning("Connection to Home Assistant lost");
                        anyhow::bail!("connection lost while watching events");
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::debug!("Received Ctrl+C, unsubscribing");
                break;
            }
        }
    }

    if let Err(e) = client.unsubscribe(subscription).await {
        tracing::debug!("Unsubscribe failed during shutdown: {}", e);
    }
    Ok(())
}
