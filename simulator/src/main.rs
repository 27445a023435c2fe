mod telemetry;

use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::env;
use std::time::Duration;
use telemetry::Turret;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let mqtt_broker = env::var("MQTT_BROKER").unwrap_or_else(|_| "localhost".to_string());
    let mqtt_port: u16 = env::var("MQTT_PORT")
        .unwrap_or_else(|_| "1883".to_string())
        .parse()
        .unwrap_or(1883);
    let num_devices: usize = env::var("DEVICES")
        .unwrap_or_else(|_| "5".to_string())
        .parse()
        .unwrap_or(5);
    let interval_ms: u64 = env::var("INTERVAL_MS")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting turret fleet simulator");
    info!(
        "Broker: {}:{}, Devices: {}, Interval: {}ms",
        mqtt_broker, mqtt_port, num_devices, interval_ms
    );

    let mut rng = rand::thread_rng();
    let client_id = format!("sim-{}", rng.gen::<u32>());

    // Connect to MQTT broker
    let mut mqtt_options = MqttOptions::new(&client_id, &mqtt_broker, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    // Spawn eventloop handler
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT eventloop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Connected to MQTT broker, publishing telemetry");

    let mut fleet: Vec<Turret> = (1..=num_devices).map(Turret::new).collect();
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    let mut counter = 0u64;

    loop {
        ticker.tick().await;

        // One random turret reports per tick, like a real fleet trickling in.
        let turret = &mut fleet[rng.gen_range(0..num_devices)];
        let reading = turret.next_reading(&mut rng);

        let topic = format!("sensors/{}/data", turret.thing_name);
        let payload = match serde_json::to_string(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize reading: {}", e);
                continue;
            }
        };

        match client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
            Ok(_) => {
                counter += 1;
                if counter % 100 == 0 {
                    info!("Published {} readings", counter);
                }
            }
            Err(e) => {
                warn!("Failed to publish: {}", e);
            }
        }
    }
}
