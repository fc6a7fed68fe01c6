mod history_list;
mod notice;
mod payment_panel;
mod status_bar;
mod wallet_panel;

pub use history_list::HistoryList;
pub use notice::{Notice, NoticeBanner};
pub use payment_panel::PaymentPanel;
pub use status_bar::StatusBar;
pub use wallet_panel::WalletPanel;
