use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    BidAcceptedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderCompletedEvent,
    RefundDecidedEvent,
    RefundRequestedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub bid_accepted_producer: Vec<EventProducer<BidAcceptedEvent>>,
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub refund_requested_producer: Vec<EventProducer<RefundRequestedEvent>>,
    pub refund_decided_producer: Vec<EventProducer<RefundDecidedEvent>>,
}

pub struct EventHandlers {
    pub on_bid_accepted: Option<EventHandler<BidAcceptedEvent>>,
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_refund_requested: Option<EventHandler<RefundRequestedEvent>>,
    pub on_refund_decided: Option<EventHandler<RefundDecidedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_bid_accepted = hooks.on_bid_accepted.map(|f| EventHandler::new(buffer_size, f));
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_requested = hooks.on_refund_requested.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_decided = hooks.on_refund_decided.map(|f| EventHandler::new(buffer_size, f));
        Self { on_bid_accepted, on_order_completed, on_refund_requested, on_refund_decided }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_bid_accepted {
            result.bid_accepted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_requested {
            result.refund_requested_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_decided {
            result.refund_decided_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_bid_accepted {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_requested {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_decided {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_bid_accepted: Option<Handler<BidAcceptedEvent>>,
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_refund_requested: Option<Handler<RefundRequestedEvent>>,
    pub on_refund_decided: Option<Handler<RefundDecidedEvent>>,
}

impl EventHooks {
    pub fn on_bid_accepted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(BidAcceptedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_bid_accepted = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_refund_requested<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundRequestedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_requested = Some(Arc::new(f));
        self
    }

    pub fn on_refund_decided<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundDecidedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_decided = Some(Arc::new(f));
        self
    }
}
