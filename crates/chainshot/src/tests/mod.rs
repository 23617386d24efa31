mod helpers;

mod events_and_state;
