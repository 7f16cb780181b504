use flock_mdns::session::Session;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let service_type = std::env::args().nth(1);
    let mut session = Session::new();
    session.start_discovery(service_type.as_deref())?;
    session.receive_responses(Duration::from_secs(3))?;

    let registry = session.registry();
    println!("{} device(s):", registry.count());
    for i in 0..registry.count() {
        if let Some(device) = registry.get(i) {
            let address = if device.address.is_empty() {
                "?"
            } else {
                device.address.as_str()
            };
            println!("  {} addr={address} port={}", device.name, device.port);
        }
    }
    Ok(())
}
