// Tests module
// Multi-node scenarios over real HTTP on localhost: gossip discovery,
// self-announcement and probe scheduling across nodes.
