// Popup-wide context: the client every panel talks through

use std::rc::Rc;
use x402_pay_core::popup::PopupClient;
use x402_pay_core::ExtensionConfig;

use crate::runtime::{BrowserClock, ChromeRuntime, ChromeTabs};

pub type Client = PopupClient<BrowserClock>;

#[derive(Clone)]
pub struct PopupContext {
    pub client: Rc<Client>,
}

// Manual PartialEq implementation (contexts don't need real equality)
impl PartialEq for PopupContext {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.client, &other.client)
    }
}

impl PopupContext {
    pub fn new(config: Rc<ExtensionConfig>) -> Self {
        Self {
            client: Rc::new(PopupClient::new(
                Rc::new(ChromeRuntime),
                Rc::new(ChromeTabs),
                BrowserClock,
                config,
            )),
        }
    }

    pub fn config(&self) -> &ExtensionConfig {
        self.client.config()
    }

    pub fn explorer_link(&self, tx_hash: &str) -> Option<String> {
        self.config().network.tx_url(tx_hash)
    }
}
