//! The MQTT side: subscribe, feed the dispatcher, acknowledge on commit.

use std::{collections::VecDeque, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use mqttmirror_core::{event::RawEvent, store::StorageBackend};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tracing::{debug, info, warn};

use crate::{
  config::MqttConfig,
  dispatch::{Ack, DispatchClosed, Dispatcher},
};

/// Pause after an event-loop error before polling again; rumqttc
/// reconnects on the next poll.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// How long to keep flushing acks and the disconnect after draining.
const DISCONNECT_LINGER: Duration = Duration::from_secs(1);

/// Client options with manual acknowledgements enabled.
pub fn options(cfg: &MqttConfig) -> MqttOptions {
  let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
  options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
  options.set_manual_acks(true);
  if let Some(username) = &cfg.username {
    options.set_credentials(username, cfg.password.as_deref().unwrap_or_default());
  }
  options
}

/// Convert a publish packet to an unvalidated event.
pub fn raw_event(publish: &Publish, received_at: DateTime<Utc>) -> RawEvent {
  RawEvent {
    topic: publish.topic.clone(),
    payload: publish.payload.clone(),
    qos: publish.qos as u8,
    retain: publish.retain,
    received_at,
  }
}

/// Poll the broker until `shutdown` resolves, then drain the dispatcher
/// within `grace` and disconnect.
///
/// Each publish is stamped with `store.current_time()` and acked only from
/// the dispatcher's completion callback. The event loop keeps being polled
/// while a worker queue is full, so keep-alives still go out during a long
/// storage outage. Publishes that arrive meanwhile wait in a backlog; it is
/// bounded by the broker's in-flight window because none of them is acked.
pub async fn run<S, F>(
  cfg: &MqttConfig,
  store: &S,
  dispatcher: Dispatcher,
  grace: Duration,
  shutdown: F,
) -> bool
where
  S: StorageBackend,
  F: Future<Output = ()>,
{
  let (client, mut eventloop) = AsyncClient::new(options(cfg), cfg.channel_capacity);
  tokio::pin!(shutdown);
  let mut backlog: VecDeque<(RawEvent, Publish)> = VecDeque::new();

  info!(host = %cfg.host, port = cfg.port, "connecting to broker");
  'run: loop {
    tokio::select! {
      _ = &mut shutdown => break 'run,
      polled = eventloop.poll() => {
        if let Some(received) = on_event(polled, &client, &cfg.topics, store).await {
          backlog.push_back(received);
        }
      }
    }

    while let Some((raw, publish)) = backlog.pop_front() {
      let dispatch = dispatcher.dispatch(raw, ack_for(client.clone(), publish));
      tokio::pin!(dispatch);
      let sent = loop {
        tokio::select! {
          biased;
          sent = &mut dispatch => break sent,
          _ = &mut shutdown => break 'run,
          polled = eventloop.poll() => {
            if let Some(received) = on_event(polled, &client, &cfg.topics, store).await {
              backlog.push_back(received);
            }
          }
        }
      };
      if let Err(DispatchClosed) = sent {
        warn!("dispatcher closed, stopping broker loop");
        break 'run;
      }
    }
  }

  info!(backlog = backlog.len(), "shutting down, draining in-flight events");
  // Keep polling while the workers drain so their acks reach the broker.
  // Publishes arriving now, and any left in the backlog, stay unacked for
  // redelivery.
  let drain = dispatcher.shutdown(grace);
  tokio::pin!(drain);
  let drained = loop {
    tokio::select! {
      drained = &mut drain => break drained,
      polled = eventloop.poll() => if polled.is_err() {
        tokio::time::sleep(RECONNECT_PAUSE).await;
      },
    }
  };

  disconnect(&client, &mut eventloop).await;
  drained
}

/// Handle one polled event, returning a publish to dispatch.
async fn on_event<S: StorageBackend>(
  polled: Result<Event, ConnectionError>,
  client: &AsyncClient,
  topics: &[String],
  store: &S,
) -> Option<(RawEvent, Publish)> {
  match polled {
    Ok(Event::Incoming(Packet::ConnAck(_))) => {
      info!("connected to broker");
      subscribe(client, topics);
      None
    }
    Ok(Event::Incoming(Packet::Publish(publish))) => {
      Some((raw_event(&publish, store.current_time()), publish))
    }
    Ok(other) => {
      debug!(event = ?other, "mqtt event");
      None
    }
    Err(e) => {
      warn!(error = %e, "mqtt connection error");
      tokio::time::sleep(RECONNECT_PAUSE).await;
      None
    }
  }
}

fn subscribe(client: &AsyncClient, topics: &[String]) {
  for topic in topics {
    match client.try_subscribe(topic, QoS::AtLeastOnce) {
      Ok(()) => info!(%topic, "subscribed"),
      Err(e) => warn!(%topic, error = %e, "subscribe failed"),
    }
  }
}

fn ack_for(client: AsyncClient, publish: Publish) -> Ack {
  Box::new(move || {
    if let Err(e) = client.try_ack(&publish) {
      warn!(topic = %publish.topic, error = %e, "ack failed");
    }
  })
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
  if let Err(e) = client.try_disconnect() {
    debug!(error = %e, "disconnect request failed");
    return;
  }
  let flush = async {
    loop {
      match eventloop.poll().await {
        Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
        Ok(_) => {}
      }
    }
  };
  if tokio::time::timeout(DISCONNECT_LINGER, flush).await.is_err() {
    debug!("broker did not confirm disconnect");
  }
}
