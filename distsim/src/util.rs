pub(crate) mod priority_queue;
