mod logout;
mod multi_profile;
mod single_logout;
mod stateful_flow;
mod stateless_flow;
