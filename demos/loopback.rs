//! Loopback - a host controller talking to a simulated LED device.
//!
//! This example demonstrates:
//! - Serving the device handler set on one end of a stream
//! - Connecting a `Controller` on the other end
//! - Issuing every command and reading the state back
//!
//! Both links run over an in-memory duplex stream; a serial port opened as a
//! tokio `AsyncRead + AsyncWrite` works the same way.

use std::time::Duration;

use mlf_proto::codec::Effect;
use mlf_proto::device::{Device, MemoryStrip};
use mlf_proto::protocol::strip;
use mlf_proto::{Controller, Link};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_stream, device_stream) = tokio::io::duplex(4096);

    // Device side: two strips behind the default handler set
    let device = Device::new(MemoryStrip::new(90), MemoryStrip::new(216));
    let device_link = Link::builder()
        .name("device")
        .handlers(device.handlers())
        .start(device_stream);

    // Host side
    let host = Link::builder()
        .name("host")
        .invoke_timeout(Duration::from_millis(500))
        .start(host_stream);
    let controller = Controller::connect(host.invoker()).await?;
    println!(
        "fw {} with {} LEDs",
        controller.fw_version(),
        controller.leds_count()
    );

    controller.turn_on().await?;
    controller.set_brightness_percent(40).await?;
    println!("brightness {}%", controller.brightness_percent().await?);

    controller
        .set_effect(Effect::ColorCycle, 3, strip::BOTH, 0x00FF_8000)
        .await?;
    for _ in 0..3 {
        println!("frame {}", device.tick());
    }
    let effect = controller.effect().await?;
    println!("effect {} at speed {}", effect.effect, effect.speed);

    let colors: Vec<u32> = (0..controller.leds_count()).map(|i| i * 0x0101).collect();
    controller.set_colors(&colors).await?;
    device.with_strips(|top, bottom| {
        println!("top[0] = {:#08x}, bottom[0] = {:#08x}", top.pixels()[0], bottom.pixels()[0]);
    });

    controller.turn_off().await?;
    println!("on: {}", controller.is_turned_on().await?);

    println!("device link {}, host link {}", device_link.name(), host.name());
    Ok(())
}
