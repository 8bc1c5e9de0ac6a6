/*!
# aeternity_rust

Wire codec and state channel client for the aeternity blockchain.

The [`builder`] module serializes transactions and chain objects to the
checksummed, prefixed strings nodes exchange (`tx_…`, `ak_…`, `cb_…`) and
back. Schemas are static tables keyed by tag and version; fees, gas and
nonces can be filled in from a node through [`node::NodeApi`].

The [`channel`] module drives a state channel through the channel
websocket of a node. Operations such as off-chain transfers, deposits or
contract calls are queued and resolve once both participants signed.

# Usage

```bash
aecli decode tx_...
aecli channel --config channel
```
*/
pub mod builder;
pub mod channel;
pub mod crypto;
pub mod encoder;
pub mod errors;
pub mod node;
pub mod rlp;
pub mod settings;

#[cfg(test)]
pub mod test_utilities;

pub use errors::{Error, Result};
