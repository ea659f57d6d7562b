//! Account snapshots (`/account`)

use serde::{Deserialize, Serialize};
use tradesync_common::{time::TimestampNormalizer, EntityKind};

use super::{merge_field, require_positive, Entity, KeyedEntity};

/// Trading account state, keyed by `login`. Carries no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub login: i64,

    pub trade_mode: Option<i32>,
    pub leverage: Option<i64>,
    pub limit_orders: Option<i32>,
    pub margin_so_mode: Option<i32>,
    pub trade_allowed: Option<bool>,
    pub trade_expert: Option<bool>,
    pub margin_mode: Option<i32>,
    pub currency_digits: Option<i32>,
    pub fifo_close: Option<bool>,

    pub balance: Option<f64>,
    pub credit: Option<f64>,
    pub profit: Option<f64>,
    pub equity: Option<f64>,
    pub margin: Option<f64>,
    pub margin_free: Option<f64>,
    pub margin_level: Option<f64>,
    pub margin_so_call: Option<f64>,
    pub margin_so_so: Option<f64>,
    pub margin_initial: Option<f64>,
    pub margin_maintenance: Option<f64>,
    pub assets: Option<f64>,
    pub liabilities: Option<f64>,
    pub commission_blocked: Option<f64>,

    pub name: Option<String>,
    pub server: Option<String>,
    pub currency: Option<String>,
    pub company: Option<String>,
}

impl Account {
    pub fn new(login: i64) -> Self {
        Self {
            login,
            trade_mode: None,
            leverage: None,
            limit_orders: None,
            margin_so_mode: None,
            trade_allowed: None,
            trade_expert: None,
            margin_mode: None,
            currency_digits: None,
            fifo_close: None,
            balance: None,
            credit: None,
            profit: None,
            equity: None,
            margin: None,
            margin_free: None,
            margin_level: None,
            margin_so_call: None,
            margin_so_so: None,
            margin_initial: None,
            margin_maintenance: None,
            assets: None,
            liabilities: None,
            commission_blocked: None,
            name: None,
            server: None,
            currency: None,
            company: None,
        }
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn normalize(&mut self, _normalizer: &TimestampNormalizer) {}

    fn validate(&self) -> Result<(), String> {
        require_positive("login", self.login)
    }
}

impl KeyedEntity for Account {
    type Key = i64;

    fn key(&self) -> i64 {
        self.login
    }

    fn merge_from(&mut self, incoming: &Self) {
        self.login = incoming.login;

        merge_field(&mut self.trade_mode, &incoming.trade_mode);
        merge_field(&mut self.leverage, &incoming.leverage);
        merge_field(&mut self.limit_orders, &incoming.limit_orders);
        merge_field(&mut self.margin_so_mode, &incoming.margin_so_mode);
        merge_field(&mut self.trade_allowed, &incoming.trade_allowed);
        merge_field(&mut self.trade_expert, &incoming.trade_expert);
        merge_field(&mut self.margin_mode, &incoming.margin_mode);
        merge_field(&mut self.currency_digits, &incoming.currency_digits);
        merge_field(&mut self.fifo_close, &incoming.fifo_close);

        merge_field(&mut self.balance, &incoming.balance);
        merge_field(&mut self.credit, &incoming.credit);
        merge_field(&mut self.profit, &incoming.profit);
        merge_field(&mut self.equity, &incoming.equity);
        merge_field(&mut self.margin, &incoming.margin);
        merge_field(&mut self.margin_free, &incoming.margin_free);
        merge_field(&mut self.margin_level, &incoming.margin_level);
        merge_field(&mut self.margin_so_call, &incoming.margin_so_call);
        merge_field(&mut self.margin_so_so, &incoming.margin_so_so);
        merge_field(&mut self.margin_initial, &incoming.margin_initial);
        merge_field(&mut self.margin_maintenance, &incoming.margin_maintenance);
        merge_field(&mut self.assets, &incoming.assets);
        merge_field(&mut self.liabilities, &incoming.liabilities);
        merge_field(&mut self.commission_blocked, &incoming.commission_blocked);

        merge_field(&mut self.name, &incoming.name);
        merge_field(&mut self.server, &incoming.server);
        merge_field(&mut self.currency, &incoming.currency);
        merge_field(&mut self.company, &incoming.company);
    }
}
