/*!
Observable state for the punchcard clients.

# Design requirements:
- Writers and readers are different types: [`Mut`] writes, [`Read`] observes
- Listeners are plain closures (or channel senders) and are removed when their guard drops
- Delivery never holds a lock, so a listener may subscribe, unsubscribe or write to *another* cell
- Stateful subscriptions come in two flavours:
  - `subscribe` - only called when the value changes
  - `subscribe_now` - called immediately with the current value, then on every change

# Basic usage

```rust
use punchcard_signals::*;

let connected = Mut::new(false);
let _guard = connected.read().subscribe_now(|value: bool| println!("connected: {value}"));
connected.set(true);
// Should print:
// connected: false
// connected: true
```
*/

mod broadcast;
mod cell;
mod subscription;
#[cfg(feature = "tokio")]
mod wait;

pub use broadcast::*;
pub use cell::*;
pub use subscription::*;
#[cfg(feature = "tokio")]
pub use wait::*;
